//! Forage 命令行入口
//!
//! 用法：`forage [--tenant <id>] [--session <id>] [--config <path>] <query...>`
//! 加载配置、初始化日志、构建编排器，跑一次查询并把 JSON 报告打印到 stdout。

use std::path::PathBuf;

use anyhow::{bail, Context};
use forage::config::load_config;
use forage::{observability, OrchestratorBuilder, Session};

struct Args {
    tenant: Option<String>,
    session: Option<String>,
    config: Option<PathBuf>,
    query: String,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut tenant = None;
    let mut session = None;
    let mut config = None;
    let mut words = Vec::new();

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--tenant" => tenant = Some(iter.next().context("--tenant needs a value")?),
            "--session" => session = Some(iter.next().context("--session needs a value")?),
            "--config" => {
                config = Some(PathBuf::from(iter.next().context("--config needs a value")?))
            }
            _ => words.push(arg),
        }
    }

    let query = words.join(" ");
    if query.trim().is_empty() {
        bail!("usage: forage [--tenant <id>] [--session <id>] [--config <path>] <query...>");
    }
    Ok(Args {
        tenant,
        session,
        config,
        query,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖；输出到 stderr，stdout 只留报告
    observability::init();

    let args = parse_args()?;
    let cfg = load_config(args.config.clone()).context("Failed to load config")?;

    let tenant = args
        .tenant
        .or_else(|| std::env::var("FORAGE_TENANT").ok())
        .or_else(|| cfg.app.default_tenant.clone())
        .unwrap_or_else(|| "default".to_string());

    let orchestrator = OrchestratorBuilder::new(cfg)
        .build()
        .context("Failed to build orchestrator")?;

    let mut session = Session::new(args.query, tenant);
    if let Some(id) = args.session {
        session = session.with_session_id(id);
    }

    let session = orchestrator
        .run_pipeline(session)
        .await
        .context("Pipeline failed")?;

    let report = serde_json::to_string_pretty(&session.report()).context("Failed to render report")?;
    println!("{report}");
    Ok(())
}

// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Main entry point for `policyshieldd` (§5 "Startup"/"Graceful shutdown").

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{error, info};

use policyshield::approval::{ApprovalBackend, ChatApprovalBackend, InMemoryApprovalBackend};
use policyshield::config::Config;
use policyshield::engine::{ShieldEngine, ShieldEngineConfig};
use policyshield::http::{build_router, routes, AppState};
use policyshield::reload::HotReloadWatcher;
use policyshield::rules::compiler;
use policyshield::sanitizer::SanitizerConfig;
use policyshield::types::{Mode, OnErrorPolicy};

#[derive(Parser, Debug)]
#[command(name = "policyshieldd", version, about, long_about = None)]
struct Cli {
    /// Path to the rule-set YAML file or directory (overrides POLICYSHIELD_RULES_PATH).
    #[arg(long)]
    rules_path: Option<PathBuf>,

    /// Address to bind the HTTP server to (overrides POLICYSHIELD_BIND_ADDR).
    #[arg(long)]
    bind_addr: Option<String>,

    /// Operating mode: enforce, audit, or disabled (overrides POLICYSHIELD_MODE).
    #[arg(long)]
    mode: Option<String>,

    /// Compile and validate the rule-set, print the result, and exit without binding.
    #[arg(long)]
    dry_run: bool,

    /// Print the JSON Schema for the rule-set YAML format and exit.
    #[cfg(feature = "schema")]
    #[arg(long)]
    schema: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    install_panic_hook();

    #[cfg(feature = "schema")]
    if cli.schema {
        let schema = schemars::schema_for!(policyshield::rules::loader::RawRuleSet);
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    let mut config = Config::from_env().unwrap_or_else(|e| {
        eprintln!("Warning: failed to load config from environment, using defaults: {e}");
        Config::default()
    });

    if let Some(path) = cli.rules_path {
        config.rules_path = path;
    }
    if let Some(addr) = cli.bind_addr {
        config.bind_addr = addr;
    }
    if let Some(mode) = cli.mode {
        config.mode = match mode.to_lowercase().as_str() {
            "enforce" => Mode::Enforce,
            "audit" => Mode::Audit,
            "disabled" => Mode::Disabled,
            other => {
                eprintln!("Warning: unrecognized --mode '{other}', keeping configured mode");
                config.mode
            }
        };
    }

    if let Err(e) = init_tracing(&config) {
        eprintln!("Warning: failed to init tracing: {e}");
    }

    info!("Starting PolicyShield");
    info!(bind_addr = %config.bind_addr, rules_path = %config.rules_path.display(), mode = ?config.mode, "configuration loaded");

    // Startup (§5): rule-set must parse and compile before anything else starts.
    let ruleset = compiler::compile_file(&config.rules_path).map_err(|e| {
        error!(error = %e, path = %config.rules_path.display(), "rule-set failed to compile at startup");
        e
    })?;
    info!(rules = ruleset.rules_count(), hash = %ruleset.content_hash, "rule-set compiled");

    if cli.dry_run {
        println!(
            "rule-set at {} is valid: {} rule(s), content hash {}",
            config.rules_path.display(),
            ruleset.rules_count(),
            ruleset.content_hash
        );
        return Ok(());
    }

    let approval_backend: Option<Arc<dyn ApprovalBackend>> = if let Some(url) = &config.approval_webhook_url {
        Some(Arc::new(ChatApprovalBackend::new(url.clone(), config.approval_ttl, config.request_timeout)))
    } else {
        Some(Arc::new(InMemoryApprovalBackend::new(config.approval_ttl)))
    };

    if let Some(backend) = &approval_backend {
        backend.start().await.map_err(|e| {
            error!(error = %e, "approval backend failed to start");
            e
        })?;
        let health = backend.health().await;
        if !health.ok {
            error!(detail = %health.detail, "approval backend failed startup health check");
            return Err(health.detail.into());
        }
    }

    let engine_config = ShieldEngineConfig {
        mode: config.mode,
        sanitizer: SanitizerConfig::default(),
        check_timeout: config.check_timeout,
        approval_timeout: config.approval_timeout,
        approval_cache_ttl: config.approval_ttl,
        on_error: if config.fail_open { OnErrorPolicy::Allow } else { OnErrorPolicy::Block },
        ..ShieldEngineConfig::default()
    };
    let trace_config = policyshield::trace::TraceConfig {
        dir: config.trace_dir.clone(),
        privacy_mode: config.trace_privacy,
        ..policyshield::trace::TraceConfig::default()
    };

    let engine = Arc::new(ShieldEngine::new(ruleset, engine_config, trace_config, approval_backend.clone()));

    let watcher = HotReloadWatcher::new(config.rules_path.clone(), policyshield::constants::defaults::RULES_POLL_INTERVAL);
    let (watcher_handle, watcher_stop) = watcher.spawn(engine.clone());

    let config = Arc::new(config);
    let state = AppState::new(engine.clone(), config.clone());
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await.map_err(|e| {
        error!(error = %e, addr = %config.bind_addr, "failed to bind HTTP listener");
        e
    })?;
    info!(addr = %config.bind_addr, "PolicyShield listening");

    let make_service = routes::into_make_service(router);
    axum::serve(listener, make_service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            error!(error = %e, "server error");
            e
        })?;

    // Graceful shutdown (§5): listener already stopped accepting and drained
    // in-flight handlers (axum's with_graceful_shutdown); tear down the rest
    // in dependency order.
    info!("stopping hot-reload watcher");
    let _ = watcher_stop.send(true);
    let _ = watcher_handle.await;

    if let Some(backend) = &approval_backend {
        info!("stopping approval backend");
        backend.stop().await;
    }

    info!("flushing trace recorder");
    engine.trace().flush();

    info!("PolicyShield shutdown complete");
    Ok(())
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };

        tracing::error!(location = %location, message = %message, "panic in spawned task");
    }));
}

fn init_tracing(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("policyshield=info,info"));

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);

    if config.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl+C received, starting graceful shutdown"),
        _ = terminate => info!("SIGTERM received, starting graceful shutdown"),
    }

    // axum's with_graceful_shutdown already waits out in-flight handlers;
    // sleeping here would only delay shutdown for no benefit.
}

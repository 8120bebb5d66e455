// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod runtime;

use anyhow::{Context, Result, anyhow, bail};
use config::Config;
use routinely_app::AppState;
use routinely_db::Store;
use runtime::StoreRuntime;
use std::env;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `routinely --print-example-config` to generate a template",
            options.config_path.display()
        )
    })?;

    let db_path = if options.demo {
        PathBuf::from(":memory:")
    } else {
        config.db_path()?
    };
    if options.print_db_path {
        println!("{}", db_path.display());
        return Ok(());
    }

    init_logging(&config)?;

    let catalog = if options.demo {
        routinely_db::demo_catalog()?
    } else {
        let path = options
            .catalog_path
            .clone()
            .or_else(|| config.catalog_path())
            .ok_or_else(|| {
                anyhow!(
                    "no product catalog configured; set [catalog].path in {} or pass --catalog <path> (or --demo)",
                    options.config_path.display()
                )
            })?;
        routinely_db::load_catalog(&path)?
    };

    let store = if options.demo {
        Store::open_memory()?
    } else {
        Store::open(&db_path).with_context(|| {
            format!(
                "open database {} -- if this path is wrong, set [storage].db_path or ROUTINELY_DB_PATH",
                db_path.display()
            )
        })?
    };
    store.bootstrap()?;
    let selection = store.load_selection()?;
    if let Some(saved_at) = store.selection_updated_at()? {
        tracing::info!(selected = selection.len(), %saved_at, "restored saved selection");
    }

    let client = routinely_llm::Client::new(
        config.chat_endpoint(),
        config.chat_model(),
        config.chat_timeout()?,
    )
    .with_context(|| {
        format!(
            "invalid [chat] config in {}; fix endpoint/model/timeout values",
            options.config_path.display()
        )
    })?;
    if options.check_only {
        tracing::info!(
            products = catalog.len(),
            selected = selection.len(),
            endpoint = client.endpoint(),
            model = client.model(),
            timeout_ms = client.timeout().as_millis() as u64,
            "startup check passed"
        );
        println!(
            "ok: {} products, {} selected, chat {} ({})",
            catalog.len(),
            selection.len(),
            client.endpoint(),
            client.model()
        );
        return Ok(());
    }

    tracing::info!(
        products = catalog.len(),
        selected = selection.len(),
        db = %db_path.display(),
        "starting session"
    );
    let mut state = AppState::new(catalog, selection, config.system_prompt());
    let mut runtime = StoreRuntime::new(&store, client);
    routinely_tui::run_app(&mut state, &mut runtime)
}

/// Sends tracing output to a file; the terminal belongs to the UI.
fn init_logging(config: &Config) -> Result<()> {
    let path = config.log_path()?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| {
            format!(
                "open log file {} -- set [log].path to a writable file",
                path.display()
            )
        })?;

    let filter = match EnvFilter::try_from_env("ROUTINELY_LOG") {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.log_level()).with_context(|| {
            format!("invalid [log].level {:?}", config.log_level())
        })?,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .context("install tracing subscriber")?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    catalog_path: Option<PathBuf>,
    print_config_path: bool,
    print_db_path: bool,
    demo: bool,
    print_example: bool,
    check_only: bool,
    show_help: bool,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        catalog_path: None,
        print_config_path: false,
        print_db_path: false,
        demo: false,
        print_example: false,
        check_only: false,
        show_help: false,
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--catalog" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--catalog requires a products.json path"))?;
                options.catalog_path = Some(PathBuf::from(value.as_ref()));
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-path" => {
                options.print_db_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--demo" => {
                options.demo = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            unknown => {
                bail!("unknown argument {unknown:?}; run with --help to see supported options");
            }
        }
    }

    if options.demo && options.catalog_path.is_some() {
        bail!("--demo uses the built-in catalog; drop --catalog or --demo");
    }

    Ok(options)
}

fn print_help() {
    println!("routinely - pick skincare products and ask for a routine");
    println!("  --config <path>          Use a specific config path");
    println!("  --catalog <path>         Load products from this JSON file");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-path             Print resolved database path");
    println!("  --print-example-config   Print a config template");
    println!("  --demo                   Launch with the built-in catalog (in-memory store)");
    println!("  --check                  Validate config, catalog, database, and chat client");
    println!("  --help                   Show this help");
}

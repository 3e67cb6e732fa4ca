use std::{env, error::Error, path::PathBuf};

use anyhow::Context;

use abcompare::{
    config::HarnessConfig, error::ConfigLoadError, ComparisonEngine, InstanceTester,
    RunCoordinator,
};

struct CliArgs {
    config: Option<PathBuf>,
    passes: Option<u32>,
    no_pre_warm: bool,
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let _ = dotenvy::dotenv();
    #[cfg(debug_assertions)]
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .init();
    #[cfg(not(debug_assertions))]
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = parse_args()?;
    let config_file = match args.config {
        Some(path) => path,
        None => env::current_dir()?.join("settings.toml"),
    };

    let mut config = match HarnessConfig::load(&config_file) {
        Ok(config) => config,
        Err(ConfigLoadError::Io(_)) => {
            // Missing config: write the defaults out so they can be edited.
            let default_config = HarnessConfig::default();
            if let Err(err) = default_config.save(&config_file) {
                log::warn!("Could not write {}: {err}", config_file.display());
            }
            default_config
        }
        Err(err @ ConfigLoadError::Parse(_)) => {
            return Err(anyhow::Error::new(err)
                .context(format!("loading {}", config_file.display()))
                .into());
        }
    };

    if let Some(passes) = args.passes {
        config.passes = passes;
    }
    if args.no_pre_warm {
        config.pre_warm = false;
    }
    config.validate()?;

    let mut coordinator = RunCoordinator::apache_bench(&config.program).timeout(config.timeout());
    if let Some(path) = &config.raw_results {
        coordinator = coordinator.raw_results(path);
    }
    let tester = InstanceTester::new(coordinator, config.defaults.clone()).host(&config.host);
    let engine = ComparisonEngine::new(tester)
        .passes(config.passes)
        .pre_warm(config.pre_warm)
        .aggregation(config.aggregation);

    let report = engine.compare(&config.instances).await?;

    println!("{}", report.render());
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("serializing report")?
        );
    }
    Ok(())
}

fn parse_args() -> anyhow::Result<CliArgs> {
    let mut parsed = CliArgs {
        config: None,
        passes: None,
        no_pre_warm: false,
        json: false,
    };

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let value = args.next().context("--config requires a value")?;
                parsed.config = Some(PathBuf::from(value));
            }
            "--passes" => {
                let value = args.next().context("--passes requires a value")?;
                parsed.passes = Some(value.parse()?);
            }
            "--no-pre-warm" => parsed.no_pre_warm = true,
            "--json" => parsed.json = true,
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other => return Err(anyhow::anyhow!("unknown arg: {other}")),
        }
    }

    if parsed.passes == Some(0) {
        return Err(anyhow::anyhow!("passes must be > 0"));
    }

    Ok(parsed)
}

fn print_help() {
    println!("abcompare options:");
    println!("  --config <path>   (default ./settings.toml)");
    println!("  --passes <n>      measurement passes per instance");
    println!("  --no-pre-warm     skip the priming call before each instance");
    println!("  --json            also print the report as JSON");
}

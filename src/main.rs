use anyhow::Context;
use bqmod::domain::model::Declared;
use bqmod::domain::ports::Confirm;
use bqmod::utils::error::BqmodError;
use bqmod::utils::{logger, validation::Validate};
use bqmod::{
    AssumeYes, CliConfig, Command, LocalWorkspace, MappingRole, ModuleEngine, ScaffoldFetcher,
    StdinConfirm, ToolSettings,
};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Exit status of `check` when config and module source disagree.
const MISMATCH_EXIT_CODE: u8 = 4;

#[tokio::main]
async fn main() -> ExitCode {
    let config = CliConfig::parse();

    // 初始化日誌
    match config.log_format {
        bqmod::config::LogFormat::Compact => logger::init_cli_logger(config.verbose),
        bqmod::config::LogFormat::Json => logger::init_json_logger(),
    }
    tracing::debug!("CLI config: {:?}", config);

    match run(&config).await {
        Ok(code) => code,
        Err(e) => report_failure(&e),
    }
}

async fn run(config: &CliConfig) -> anyhow::Result<ExitCode> {
    let dir = Path::new(&config.dir);
    let settings_path = dir.join(&config.settings);
    let settings = ToolSettings::load_or_default(&settings_path)
        .with_context(|| format!("failed to load settings from {}", settings_path.display()))?;
    settings.validate()?;

    let workspace = LocalWorkspace::new(dir, settings);
    if config.assume_yes {
        dispatch(ModuleEngine::new(workspace, AssumeYes), &config.command).await
    } else {
        dispatch(ModuleEngine::new(workspace, StdinConfirm), &config.command).await
    }
}

async fn dispatch<C: Confirm>(
    engine: ModuleEngine<LocalWorkspace, C>,
    command: &Command,
) -> anyhow::Result<ExitCode> {
    match command {
        Command::Init { force } => {
            engine.init(*force)?;
            println!("✅ Initialized {}", engine.workspace().settings().paths.config);
        }
        Command::Set { .. } => {
            let update = command.field_update().unwrap_or_default();
            let saved = engine.set_fields(&update)?;
            if update.name.is_some() {
                println!("✅ Name: {}", saved.name.unwrap_or_default());
            }
            if update.author.is_some() {
                println!("✅ Author: {}", saved.author.unwrap_or_default());
            }
            if update.description.is_some() {
                println!("✅ Description: {}", saved.description.unwrap_or_default());
            }
        }
        Command::Inputs(args) | Command::Outputs(args) => {
            let role = if matches!(command, Command::Inputs(_)) {
                MappingRole::Input
            } else {
                MappingRole::Output
            };
            let kind = args.kind.kind();
            match engine.declare(role, &args.name, kind, args.mode())? {
                Declared::Added => println!("✅ Added {} '{}' ({})", role, args.name, kind),
                Declared::Replaced { previous } => println!(
                    "✅ Replaced {} '{}' ({} -> {})",
                    role, args.name, previous, kind
                ),
                Declared::Kept { existing } => {
                    println!("ℹ️  Kept existing {} '{}' ({})", role, args.name, existing)
                }
            }
        }
        Command::Summary => print!("{}", engine.summary()?),
        Command::Check { source } => {
            let report = engine.check(source.as_deref())?;
            println!("{}", report.render_table());
            if report.has_mismatch() {
                for line in report.diagnostics() {
                    eprintln!("⚠️  {}", line);
                }
                return Ok(ExitCode::from(MISMATCH_EXIT_CODE));
            }
            println!("✅ Config and module source agree");
        }
        Command::Create { source, yes } => {
            let report = engine.create_with(source.as_deref(), *yes, |check| {
                println!("{}", check.render_table());
            })?;
            println!("✅ Descriptor created: {}", report.descriptor_path);
            if let Some(help) = report.help_path {
                println!("📄 Help page: {}", help);
            }
        }
        Command::Fetch { dest } => {
            let workspace = engine.workspace();
            let dest = dest
                .as_deref()
                .map(PathBuf::from)
                .unwrap_or_else(|| workspace.base_path().to_path_buf());
            let fetcher = ScaffoldFetcher::new(workspace.settings().bootstrap.clone());
            for path in fetcher.fetch_all(&dest).await? {
                println!("✅ Fetched {}", path.display());
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn report_failure(error: &anyhow::Error) -> ExitCode {
    let Some(e) = error.downcast_ref::<BqmodError>() else {
        tracing::error!("❌ {:#}", error);
        eprintln!("❌ {:#}", error);
        return ExitCode::FAILURE;
    };

    // 記錄詳細錯誤信息
    tracing::error!(
        "❌ {:#} (Category: {:?}, Severity: {:?})",
        error,
        e.category(),
        e.severity()
    );
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

    // 根據錯誤嚴重程度決定退出碼
    ExitCode::from(e.severity().exit_code())
}

use anyhow::{bail, Context, Result};
use chrono::TimeDelta;
use clap::{Args, Parser, Subcommand, ValueEnum};
use photo_sequencer_core::{
    app_paths, format_time_shift, generate_plan, load_config, parse_time_shift, save_config,
    validate_template, AppConfig, CancelFlag, Conflict, ExifMetadata, Executor, PlanOptions,
    RenamePlan, Session,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "photo-sequencer-cli")]
#[command(about = "複数カメラのJPG写真を撮影時刻順に並べ、連番付きの名前で出力先へコピーします")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// 命名計画を表示します (ファイルは変更しません)
    Plan(SessionArgs),
    /// 命名計画どおりにコピーします
    Run(RunArgs),
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
struct SessionArgs {
    /// 入力フォルダまたはファイル。指定ごとに1つのグループになります
    #[arg(long = "source", required = true)]
    sources: Vec<PathBuf>,
    /// グループの時刻補正 (例: 2=+01:30, 1=-1.02:00:00)
    #[arg(long = "shift", value_name = "GROUP=SHIFT", value_parser = parse_shift_arg)]
    shifts: Vec<(usize, TimeDelta)>,
    /// 並び順の手動移動 (1始まり, 補正の後に適用)
    #[arg(long = "move", value_name = "FROM:TO", value_parser = parse_move_arg)]
    moves: Vec<(usize, usize)>,
    #[arg(long)]
    target: Option<PathBuf>,
    #[arg(long)]
    template: Option<String>,
    #[arg(long)]
    start: Option<u32>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[command(flatten)]
    session: SessionArgs,
    /// 使用した出力先とテンプレートを設定に保存します
    #[arg(long, default_value_t = false)]
    save: bool,
}

#[derive(Debug, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    Show,
    Set(ConfigSetArgs),
}

#[derive(Debug, Args)]
struct ConfigSetArgs {
    #[arg(long)]
    target: Option<PathBuf>,
    #[arg(long)]
    template: Option<String>,
    #[arg(long)]
    start: Option<u32>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Plan(args) => cmd_plan(args),
        Commands::Run(args) => cmd_run(args),
        Commands::Config(config) => match config.action {
            ConfigAction::Show => cmd_config_show(),
            ConfigAction::Set(args) => cmd_config_set(args),
        },
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("photo_sequencer=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn cmd_plan(args: SessionArgs) -> Result<()> {
    let config = load_config()?;
    let (session, options) = build_session(&args, &config)?;
    let plan = generate_plan(&session, &options)?;
    print_plan(&session, &plan, args.output)?;

    if plan.target_dir.is_none() {
        eprintln!("出力先が未指定のため競合は判定できません。--target を指定してください。");
    }
    Ok(())
}

fn cmd_run(args: RunArgs) -> Result<()> {
    let mut config = load_config()?;
    let (session, options) = build_session(&args.session, &config)?;
    let plan = generate_plan(&session, &options)?;
    print_plan(&session, &plan, args.session.output)?;

    if plan.target_dir.is_none() {
        bail!("出力先フォルダが指定されていません。--target を指定してください。");
    }
    if plan.has_conflict() {
        bail!(
            "競合があるため実行できません: {}件。テンプレートか出力先を変更してください。",
            plan.conflict_count()
        );
    }

    let total = plan.len();
    let mut executor = Executor::new(Arc::new(ExifMetadata));
    install_cancel_handler(executor.cancel_flag())?;
    executor.start(plan)?;
    while executor.is_running() {
        eprint!("\rコピー中: {}/{}", executor.progress(), total);
        thread::sleep(Duration::from_millis(200));
    }
    eprintln!();

    let report = match executor.wait() {
        Some(Ok(report)) => report,
        Some(Err(err)) => {
            return Err(err).context("実行に失敗しました (それまでのコピーは残っています)");
        }
        None => bail!("実行が開始されていません"),
    };

    if report.cancelled {
        eprintln!("中断しました: {}/{}件", report.completed, report.total);
    } else {
        eprintln!("コピー完了: {}件", report.completed);
    }
    for failure in &report.metadata_failures {
        eprintln!(
            "撮影時刻の書き換えに失敗: {} ({})",
            failure.path.display(),
            failure.message
        );
    }

    if args.save {
        config.target_dir = options.target_dir;
        config.template = options.template;
        if let Some(start) = options.start_counter {
            config.start_counter = start;
        }
        save_config(&config)?;
        eprintln!("設定を保存しました");
    }

    Ok(())
}

/// Ctrl-C requests a cooperative cancel; the copy in flight finishes (or is
/// cleaned up) before the worker stops.
fn install_cancel_handler(cancel: CancelFlag) -> Result<()> {
    ctrlc::set_handler(move || {
        if !cancel.is_cancelled() {
            tracing::warn!("cancel requested, stopping after the current file");
        }
        cancel.cancel();
    })
    .context("Ctrl-Cハンドラを登録できませんでした")
}

fn cmd_config_show() -> Result<()> {
    let config = load_config()?;
    let paths = app_paths()?;
    println!("設定ファイル: {}", paths.config_path.display());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_config_set(args: ConfigSetArgs) -> Result<()> {
    let mut config = load_config()?;
    if let Some(target) = args.target {
        config.target_dir = Some(target);
    }
    if let Some(template) = args.template {
        validate_template(&template)?;
        config.template = template;
    }
    if let Some(start) = args.start {
        config.start_counter = start;
    }
    save_config(&config)?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

/// Loads every `--source` as its own group, then applies shifts and moves.
fn build_session(args: &SessionArgs, config: &AppConfig) -> Result<(Session, PlanOptions)> {
    let template = args
        .template
        .clone()
        .unwrap_or_else(|| config.template.clone());
    validate_template(&template)?;

    let mut session = Session::new();
    for source in &args.sources {
        if session
            .add_source(std::slice::from_ref(source), &ExifMetadata)?
            .is_none()
        {
            tracing::warn!(source = %source.display(), "no new photos in source");
        }
    }

    for &(index, shift) in &args.shifts {
        let id = session
            .group_at(index)
            .map(|g| g.id())
            .with_context(|| format!("グループ番号が範囲外です: {index}"))?;
        session.set_time_shift(id, shift)?;
    }

    for &(from, to) in &args.moves {
        let record = from
            .checked_sub(1)
            .and_then(|i| session.order_ids().get(i).copied())
            .with_context(|| format!("移動元の位置が範囲外です: {from}"))?;
        let to = to
            .checked_sub(1)
            .with_context(|| format!("移動先の位置が範囲外です: {to}"))?;
        session.move_to(record, to)?;
    }

    let options = PlanOptions {
        template,
        target_dir: args.target.clone().or_else(|| config.target_dir.clone()),
        start_counter: Some(args.start.unwrap_or(config.start_counter)),
    };
    Ok((session, options))
}

fn print_plan(session: &Session, plan: &RenamePlan, output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(plan)?);
        }
        OutputFormat::Table => {
            for group in session.groups() {
                println!(
                    "{} [{}] {}件 補正 {}",
                    group.title(),
                    group.camera(),
                    group.count(),
                    format_time_shift(group.time_shift())
                );
            }
            println!("\n元ファイル -> 新ファイル (撮影時刻)");
            for entry in &plan.entries {
                let mark = match entry.conflict {
                    Conflict::Conflict => " [競合]",
                    Conflict::Clear | Conflict::Unknown => "",
                };
                println!(
                    "{} -> {} ({}){}",
                    entry.old_name,
                    entry.new_name,
                    entry.effective_time.format("%Y-%m-%d %H:%M:%S"),
                    mark
                );
            }
            println!(
                "\n集計: groups={} photos={} conflicts={}",
                session.groups().len(),
                plan.len(),
                plan.conflict_count()
            );
        }
    }
    Ok(())
}

fn parse_shift_arg(input: &str) -> Result<(usize, TimeDelta), String> {
    let (group, shift) = input
        .split_once('=')
        .ok_or_else(|| format!("GROUP=SHIFT の形式で指定してください: {input}"))?;
    let group = group
        .trim()
        .parse::<usize>()
        .map_err(|_| format!("グループ番号が不正です: {group}"))?;
    let shift = parse_time_shift(shift).map_err(|e| e.to_string())?;
    Ok((group, shift))
}

fn parse_move_arg(input: &str) -> Result<(usize, usize), String> {
    let (from, to) = input
        .split_once(':')
        .ok_or_else(|| format!("FROM:TO の形式で指定してください: {input}"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<usize>()
            .map_err(|_| format!("位置が不正です: {v}"))
    };
    Ok((parse(from)?, parse(to)?))
}

mod cli;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use cli::{Args, CaptionArgs, Command, ConfigAction};
use neuroscan_lib::diagnosis::{
    ConfidenceGate, Diagnoser, JsonRenderer, ScoringFunction, TerminalRenderer, VerdictRenderer,
};
use neuroscan_lib::logger::init_cli_logger;
use neuroscan_lib::model::{load_metadata, metadata_summary, AppConfig, DeviceType};
use neuroscan_lib::session::{collect_scans, write_batch_report, Session};

/// 診断できなかった入力があった場合の終了コード
const EXIT_SCAN_FAILURES: i32 = 2;

fn main() {
    let args = Args::parse();
    init_cli_logger(args.verbose);

    match run(args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            tracing::error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(args: Args) -> Result<i32> {
    let mut config = AppConfig::load_or_default(&args.config);
    if let Some(device) = args.device {
        config.set_device_type(device.into());
    }
    if let Some(ref model) = args.model {
        config.set_model_path(model.to_string_lossy().to_string());
    }

    match args.command {
        Command::Diagnose {
            images,
            json,
            pretty,
            caption,
        } => {
            let mut session = open_session(&config, &caption)?;
            let renderer: Box<dyn VerdictRenderer> = if json {
                Box::new(JsonRenderer { pretty })
            } else {
                Box::new(TerminalRenderer::default())
            };

            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            for (i, path) in images.iter().enumerate() {
                let rendered = session.diagnose_and_render(path, renderer.as_ref());
                if !json && i > 0 {
                    writeln!(out)?;
                }
                writeln!(out, "{}", rendered)?;
            }

            let last_dir = images
                .last()
                .and_then(|p| p.parent())
                .filter(|d| !d.as_os_str().is_empty());
            if let Some(dir) = last_dir {
                remember_scan_dir(&mut config, &args.config, dir);
            }
            Ok(exit_code(session.stats().has_failures()))
        }
        Command::Interactive { caption } => {
            let mut session = open_session(&config, &caption)?;
            let stdin = std::io::stdin();
            let stdout = std::io::stdout();
            session.run_interactive(stdin.lock(), stdout.lock(), &TerminalRenderer::default())?;
            Ok(0)
        }
        Command::Batch { dir, output, caption } => {
            let scans = collect_scans(&dir)
                .with_context(|| format!("ディレクトリを読み込めません: {}", dir.display()))?;
            if scans.is_empty() {
                bail!("診断対象の画像がありません: {}", dir.display());
            }
            tracing::info!("{} 件の画像を診断します", scans.len());

            let mut session = open_session(&config, &caption)?;
            let file = File::create(&output)
                .with_context(|| format!("レポートを作成できません: {}", output.display()))?;
            let stats = write_batch_report(&mut session, &scans, BufWriter::new(file))?;

            println!(
                "{} 件を診断しました (NORMAL {} / TUMOR {} / UNKNOWN {} / 拒否 {} / 失敗 {})",
                stats.diagnosed(),
                stats.normal,
                stats.tumor,
                stats.unknown,
                stats.rejected,
                stats.failed
            );
            println!("レポート: {}", output.display());

            remember_scan_dir(&mut config, &args.config, &dir);
            Ok(exit_code(stats.has_failures()))
        }
        Command::Train {
            data_dir,
            output,
            epochs,
            batch_size,
            learning_rate,
        } => {
            let mut training = config.training.clone();
            if let Some(epochs) = epochs {
                training.num_epochs = epochs;
            }
            if let Some(batch_size) = batch_size {
                training.batch_size = batch_size;
            }
            if let Some(learning_rate) = learning_rate {
                training.learning_rate = learning_rate;
            }
            let output_path = output.unwrap_or_else(|| config.model.model_path.clone().into());

            let saved = train(
                config.device_type,
                &data_dir,
                &output_path,
                &config,
                training,
            )?;
            println!("モデルを保存しました: {}", saved.display());
            Ok(0)
        }
        Command::Inspect { model } => {
            let metadata = load_metadata(&model)?;
            println!("{}", metadata_summary(&metadata));
            Ok(0)
        }
        Command::Config { action } => {
            match action {
                ConfigAction::Show => println!("{}", config.summary()),
                ConfigAction::Init { force } => {
                    if args.config.exists() && !force {
                        bail!(
                            "設定ファイルは既に存在します: {} (上書きするには --force)",
                            args.config.display()
                        );
                    }
                    AppConfig::default().save(&args.config)?;
                    println!("設定ファイルを作成しました: {}", args.config.display());
                }
            }
            Ok(0)
        }
    }
}

fn exit_code(has_failures: bool) -> i32 {
    if has_failures {
        EXIT_SCAN_FAILURES
    } else {
        0
    }
}

/// モデルを1度だけ読み込み、セッションを作る
fn open_session(config: &AppConfig, caption: &CaptionArgs) -> Result<Session<Box<dyn ScoringFunction>>> {
    let gate = ConfidenceGate::new(config.gate.min_confidence)?;
    let scorer = load_scorer(Path::new(&config.model.model_path), config.device_type)?;
    let diagnoser = Diagnoser::new(scorer, gate);
    tracing::debug!(
        "最小信頼度: {:.0}%",
        diagnoser.gate().min_confidence() * 100.0
    );
    Ok(Session::new(diagnoser).with_caption(caption.patient_id.clone(), caption.sequence))
}

fn remember_scan_dir(config: &mut AppConfig, config_path: &Path, dir: &Path) {
    if !config_path.exists() {
        return;
    }
    config.update_last_scan_dir(dir);
    if let Err(e) = config.save(config_path) {
        tracing::warn!("設定ファイルの更新に失敗しました: {}", e);
    }
}

#[cfg(feature = "ml")]
fn load_scorer(model_path: &Path, device_type: DeviceType) -> Result<Box<dyn ScoringFunction>> {
    tracing::info!("モデルを読み込みます: {}", model_path.display());
    neuroscan_lib::ml::load_scorer(model_path, device_type)
        .with_context(|| format!("モデルを読み込めません: {}", model_path.display()))
}

#[cfg(not(feature = "ml"))]
fn load_scorer(_model_path: &Path, _device_type: DeviceType) -> Result<Box<dyn ScoringFunction>> {
    bail!("このビルドには推論機能が含まれていません (feature \"ml\" を有効にしてください)")
}

#[cfg(feature = "ml")]
fn train(
    device_type: DeviceType,
    data_dir: &Path,
    output_path: &Path,
    config: &AppConfig,
    training: neuroscan_lib::model::TrainingSettings,
) -> Result<std::path::PathBuf> {
    let job = neuroscan_lib::ml::TrainingJob {
        data_dir: data_dir.to_path_buf(),
        output_path: output_path.to_path_buf(),
        model: config.model.clone(),
        training,
    };
    neuroscan_lib::ml::train_on(device_type, &job)
}

#[cfg(not(feature = "ml"))]
fn train(
    _device_type: DeviceType,
    _data_dir: &Path,
    _output_path: &Path,
    _config: &AppConfig,
    _training: neuroscan_lib::model::TrainingSettings,
) -> Result<std::path::PathBuf> {
    bail!("このビルドには学習機能が含まれていません (feature \"ml\" を有効にしてください)")
}

use clap::{Parser, Subcommand, ValueEnum};
use neuroscan_lib::diagnosis::MriSequence;
use neuroscan_lib::model::{AppConfig, DeviceType};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "neuroscan", version, about = "Brain MRI tumor screening with a confidence gate")]
pub struct Args {
    /// 設定ファイル (JSON)
    #[arg(long, global = true, default_value_os_t = AppConfig::default_path())]
    pub config: PathBuf,

    /// モデルファイル (設定ファイルの値を上書き)
    #[arg(long, global = true)]
    pub model: Option<PathBuf>,

    /// 計算デバイス (設定ファイルの値を上書き)
    #[arg(long, global = true, value_enum)]
    pub device: Option<DeviceChoice>,

    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, clap::Args)]
pub struct CaptionArgs {
    #[arg(long, default_value = neuroscan_lib::diagnosis::render::DEFAULT_PATIENT_ID)]
    pub patient_id: String,

    /// T1-Weighted, T2-Weighted, FLAIR, T1-Contrast, T2-Contrast, DWI, SWI
    #[arg(long, default_value = "T1-Weighted")]
    pub sequence: MriSequence,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// 画像を診断して結果を表示
    Diagnose {
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// JSON (1件1行) で出力
        #[arg(long, default_value_t = false)]
        json: bool,
        /// JSON を整形して出力 (--json と併用)
        #[arg(long, default_value_t = false, requires = "json")]
        pretty: bool,
        #[command(flatten)]
        caption: CaptionArgs,
    },
    /// 画像パスを1行ずつ読み込んで診断
    Interactive {
        #[command(flatten)]
        caption: CaptionArgs,
    },
    /// ディレクトリ内の画像をまとめて診断しCSVに出力
    Batch {
        dir: PathBuf,
        #[arg(long, short, default_value = "report.csv")]
        output: PathBuf,
        #[command(flatten)]
        caption: CaptionArgs,
    },
    /// クラスフォルダ (例: no/, yes/) からモデルを学習
    Train {
        data_dir: PathBuf,
        #[arg(long, short)]
        output: Option<PathBuf>,
        #[arg(long)]
        epochs: Option<usize>,
        #[arg(long)]
        batch_size: Option<usize>,
        #[arg(long)]
        learning_rate: Option<f64>,
    },
    /// モデルファイルのメタデータを表示
    Inspect { model: PathBuf },
    /// 設定ファイルの表示・作成
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// 現在の設定を表示
    Show,
    /// デフォルト設定をファイルに書き出す
    Init {
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DeviceChoice {
    Cpu,
    Wgpu,
}

impl From<DeviceChoice> for DeviceType {
    fn from(value: DeviceChoice) -> Self {
        match value {
            DeviceChoice::Cpu => DeviceType::Cpu,
            DeviceChoice::Wgpu => DeviceType::Wgpu,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_diagnose() {
        let args = Args::parse_from([
            "neuroscan", "diagnose", "a.png", "b.jpg", "--json", "--sequence", "flair", "--device", "wgpu",
        ]);
        assert!(matches!(args.device, Some(DeviceChoice::Wgpu)));
        assert_eq!(args.config, AppConfig::default_path());
        match args.command {
            Command::Diagnose {
                images,
                json,
                pretty,
                caption,
            } => {
                assert_eq!(images.len(), 2);
                assert!(json);
                assert!(!pretty);
                assert_eq!(caption.sequence, MriSequence::Flair);
                assert_eq!(caption.patient_id, "PT-4920");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_pretty_requires_json() {
        assert!(Args::try_parse_from(["neuroscan", "diagnose", "a.png", "--pretty"]).is_err());
        let args = Args::parse_from(["neuroscan", "diagnose", "a.png", "--json", "--pretty"]);
        assert!(matches!(args.command, Command::Diagnose { pretty: true, .. }));
    }

    #[test]
    fn test_diagnose_requires_image() {
        assert!(Args::try_parse_from(["neuroscan", "diagnose"]).is_err());
    }
}

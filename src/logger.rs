//! ログ出力の初期化

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// CLI用のロガーを初期化
///
/// `RUST_LOG` が設定されていればそちらを優先します。ログは標準エラーに出力します。
pub fn init_cli_logger(verbose: bool) {
    let default_filter = if verbose {
        "neuroscan=debug,neuroscan_lib=debug,warn"
    } else {
        "neuroscan=info,neuroscan_lib=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

use anyhow::Result;
use clap::Parser;
use hostfleet::cli::{Supervisor, templates};
use hostfleet::infra::config::{
    DEFAULT_CONFIG_PATH, DEFAULT_SPEC_DIR, GlobalConfig, expand_path, load_global_config,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "hostfleet",
    version,
    about = "Mantém o número declarado de containers rodando em um host"
)]
struct Cli {
    /// Arquivo de configuração global
    #[arg(short, long, env = "HOSTFLEET_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Diretório com uma spec por grupo de containers
    #[arg(long, env = "HOSTFLEET_CONF_DIR", default_value = DEFAULT_SPEC_DIR)]
    conf_dir: PathBuf,

    /// Força log em nível debug
    #[arg(short, long)]
    debug: bool,

    /// Valida a configuração e sai
    #[arg(short, long)]
    test_config: bool,

    /// Imprime modelos de configuração e sai
    #[arg(long)]
    template: bool,
}

/// `--debug` wins over `RUST_LOG`, which wins over `log_level` in the config.
fn init_logging(debug: bool, config: &GlobalConfig) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.log_filter().unwrap_or("info")))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.template {
        print!("{}", templates());
        return Ok(());
    }

    let config_path = expand_path(&cli.config);
    let spec_dir = expand_path(&cli.conf_dir);

    let config = load_global_config(&config_path)?;
    init_logging(cli.debug, &config);
    info!("Iniciando hostfleet {}", env!("CARGO_PKG_VERSION"));

    let supervisor = Supervisor::new(config, &config_path, &spec_dir)?;

    if cli.test_config {
        supervisor.check()?;
        info!("✅ Configuração OK");
        return Ok(());
    }

    supervisor.run()
}

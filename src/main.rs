//! frps-panel - frps 管理面板
//!
//! Usage:
//! - Normal mode: `frps-panel`
//! - With custom port: `frps-panel --port 8080`

use frps_panel::RuntimeConfig;
use tracing_subscriber::EnvFilter;

/// 解析命令行参数
fn parse_args() -> RuntimeConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = RuntimeConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" if i + 1 < args.len() => {
                config.port_override = args[i + 1].parse().ok();
                i += 2;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                i += 1;
            }
        }
    }

    config
}

fn print_help() {
    println!("frps-panel - frps 管理面板");
    println!();
    println!("USAGE:");
    println!("    frps-panel [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --port <PORT>    Override the listening port (default: $PORT or 3000)");
    println!("    -h, --help       Print help information");
    println!();
    println!("ENVIRONMENT:");
    println!("    ADMIN_USER / ADMIN_PASSWORD   Panel credentials");
    println!("    FRPS_CONFIG_PATH              frps.toml location");
    println!("    FRPS_SERVICE                  systemd unit name");
    println!("    FRPS_DASHBOARD_URL            frps webServer for connection stats");
}

fn main() {
    // .env 缺失不是错误；ENV_FILE 同时决定修改密码时写回的文件
    let env_file = std::env::var("ENV_FILE").unwrap_or_else(|_| ".env".to_string());
    let _ = dotenvy::from_path(&env_file);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = parse_args();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(frps_panel::run(config)) {
        tracing::error!(error = %format!("{:#}", e), "frps panel exited with error");
        std::process::exit(1);
    }
}

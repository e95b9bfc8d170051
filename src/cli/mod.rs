mod serve;

use anyhow::{Context, Result, anyhow};
use console::style;
use std::path::PathBuf;

use crate::core::config::ServiceConfig;
use crate::core::terminal::{self, GuideSection};

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Commands")
        .command("serve", "Start the API server (default)")
        .command("config", "Print the resolved configuration")
        .command("help", "Show this help message")
        .print();

    GuideSection::new("Options")
        .text("--api-host <host>     Interface to bind (default: 0.0.0.0)")
        .text("--api-port <port>     Port to bind (default: 8001)")
        .text("--config <path>       TOML config file (or STUDIO_CONFIG)")
        .print();

    println!(
        "\n {} {} [command] [options]\n",
        style("Usage:").bold(),
        style("studio-engine").green()
    );
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ServeFlags {
    pub api_host: Option<String>,
    pub api_port: Option<u16>,
    pub config_path: Option<PathBuf>,
}

pub(crate) fn parse_serve_flags(args: &[String], start: usize) -> Result<ServeFlags> {
    let mut flags = ServeFlags::default();
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--api-port" => {
                if i + 1 < args.len() {
                    let raw = &args[i + 1];
                    flags.api_port = Some(
                        raw.parse()
                            .with_context(|| format!("--api-port expects a port, got '{raw}'"))?,
                    );
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--api-host" => {
                if i + 1 < args.len() {
                    flags.api_host = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    flags.config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    Ok(flags)
}

/// Config file, then environment, then command-line flags.
pub(crate) fn resolve_config<F>(flags: &ServeFlags, lookup: F) -> Result<ServiceConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let path = flags
        .config_path
        .clone()
        .or_else(|| lookup("STUDIO_CONFIG").map(PathBuf::from));
    let mut config = match path {
        Some(path) => ServiceConfig::from_file(&path)?,
        None => ServiceConfig::default(),
    };
    config.apply_env(lookup)?;
    if let Some(host) = &flags.api_host {
        config.api_host = host.clone();
    }
    if let Some(port) = flags.api_port {
        config.api_port = port;
    }
    Ok(config)
}

fn show_config(config: &ServiceConfig) -> Result<()> {
    let rendered = toml::to_string_pretty(config).context("rendering config")?;
    GuideSection::new("Resolved Configuration")
        .status("API key", &config.masked_key())
        .status("Database", &config.db_path().display().to_string())
        .print();
    println!("\n{rendered}");
    Ok(())
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    dispatch(&args).await
}

pub(crate) async fn dispatch(args: &[String]) -> Result<()> {
    let (cmd, flag_start) = match args.get(1).map(String::as_str) {
        Some(arg) if !arg.starts_with('-') => (arg, 2),
        _ => ("serve", 1),
    };

    match cmd {
        "serve" => {
            let flags = parse_serve_flags(args, flag_start)?;
            let config = resolve_config(&flags, |key| std::env::var(key).ok())?;
            serve::run(config).await
        }
        "config" => {
            let flags = parse_serve_flags(args, flag_start)?;
            let config = resolve_config(&flags, |key| std::env::var(key).ok())?;
            show_config(&config)
        }
        "help" => {
            print_help();
            Ok(())
        }
        other => {
            print_help();
            Err(anyhow!("Unknown command '{other}'"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_serve_flags_reads_host_port_and_config() {
        let argv = args(&[
            "studio-engine",
            "serve",
            "--api-host",
            "127.0.0.1",
            "--api-port",
            "9100",
            "--config",
            "/etc/studio.toml",
        ]);
        let flags = parse_serve_flags(&argv, 2).unwrap();
        assert_eq!(flags.api_host.as_deref(), Some("127.0.0.1"));
        assert_eq!(flags.api_port, Some(9100));
        assert_eq!(flags.config_path, Some(PathBuf::from("/etc/studio.toml")));
    }

    #[test]
    fn parse_serve_flags_ignores_unknown_and_dangling_flags() {
        let argv = args(&["studio-engine", "--verbose", "--api-host"]);
        let flags = parse_serve_flags(&argv, 1).unwrap();
        assert_eq!(flags, ServeFlags::default());
    }

    #[test]
    fn parse_serve_flags_rejects_bad_port() {
        let argv = args(&["studio-engine", "--api-port", "not-a-port"]);
        assert!(parse_serve_flags(&argv, 1).is_err());
    }

    #[tokio::test]
    async fn unknown_command_is_an_error() {
        let err = dispatch(&args(&["studio-engine", "deploy"])).await.unwrap_err();
        assert!(err.to_string().contains("deploy"));
        assert!(dispatch(&args(&["studio-engine", "help"])).await.is_ok());
    }

    #[test]
    fn flags_override_environment() {
        let env: HashMap<&str, &str> =
            HashMap::from([("STUDIO_API_PORT", "9000"), ("STUDIO_API_HOST", "10.0.0.1")]);
        let flags = ServeFlags {
            api_port: Some(9200),
            ..Default::default()
        };
        let config = resolve_config(&flags, |k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.api_port, 9200);
        assert_eq!(config.api_host, "10.0.0.1");
    }

    #[test]
    fn config_file_comes_from_studio_config_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("studio.toml");
        std::fs::write(&path, "api_port = 9300\nimage_model = \"dall-e-3\"\n").unwrap();
        let path_str = path.display().to_string();

        let config = resolve_config(&ServeFlags::default(), |k| {
            (k == "STUDIO_CONFIG").then(|| path_str.clone())
        })
        .unwrap();
        assert_eq!(config.api_port, 9300);
        assert_eq!(config.image_model, "dall-e-3");
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let flags = ServeFlags {
            config_path: Some(PathBuf::from("/nonexistent/studio.toml")),
            ..Default::default()
        };
        assert!(resolve_config(&flags, |_| None).is_err());
    }
}

//! tinyfaas-cli - a thin HTTP client for the tinyfaas server.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::Value;

const DEFAULT_BASE_URL: &str = "http://localhost:8080";

#[derive(Parser, Debug)]
#[command(name = "tinyfaas-cli")]
#[command(about = "Client for a tinyfaas server", long_about = None)]
struct Cli {
    /// Base URL of the tinyfaas server.
    #[arg(long, global = true, env = "BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Invoke arbitrary source code ad hoc.
    Invoke {
        /// Path to the module source, or `-` to read from stdin.
        source: PathBuf,
        /// JSON payload to pass to the default export.
        #[arg(long)]
        payload: Option<String>,
    },
    /// Manage persisted functions.
    #[command(subcommand)]
    Functions(FunctionCommands),
}

#[derive(Subcommand, Debug)]
enum FunctionCommands {
    /// Create a new function.
    Create {
        #[arg(long)]
        name: Option<String>,
    },
    /// Deploy source to an existing function.
    Deploy {
        #[arg(long = "function-id")]
        function_id: String,
        source: PathBuf,
    },
    /// Invoke a function's live deployment.
    Invoke {
        #[arg(long = "function-id")]
        function_id: String,
        #[arg(long)]
        payload: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Http(status, message)) => {
            eprintln!("{message}");
            if status == 422 {
                ExitCode::from(1)
            } else {
                ExitCode::from(2)
            }
        }
        Err(CliError::Other(message)) => {
            eprintln!("{message}");
            ExitCode::from(2)
        }
    }
}

enum CliError {
    Http(u16, String),
    Other(String),
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Other(e.to_string())
    }
}

fn run(cli: &Cli) -> Result<(), CliError> {
    match &cli.command {
        Commands::Invoke { source, payload } => {
            let src = read_source(source)?;
            let body = serde_json::json!({
                "source": src,
                "payload": parse_payload(payload.as_deref())?,
            });
            let value = post(&format!("{}/invoke", cli.base_url), &body)?;
            print_json(&value);
        }
        Commands::Functions(FunctionCommands::Create { name }) => {
            let body = serde_json::json!({ "name": name });
            let value = post(&format!("{}/functions", cli.base_url), &body)?;
            print_json(&value);
        }
        Commands::Functions(FunctionCommands::Deploy {
            function_id,
            source,
        }) => {
            let src = read_source(source)?;
            let body = serde_json::json!({ "source": src });
            let value = post(
                &format!("{}/functions/{}/deployments", cli.base_url, function_id),
                &body,
            )?;
            print_json(&value);
        }
        Commands::Functions(FunctionCommands::Invoke {
            function_id,
            payload,
        }) => {
            let body = parse_payload(payload.as_deref())?;
            let value = post(
                &format!("{}/functions/{}/invocations", cli.base_url, function_id),
                &body,
            )?;
            print_json(&value);
        }
    }
    Ok(())
}

fn read_source(path: &PathBuf) -> Result<String, CliError> {
    if path.as_os_str() == "-" {
        use std::io::Read;
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| CliError::Other(e.to_string()))?;
        Ok(buf)
    } else {
        fs::read_to_string(path).map_err(|e| CliError::Other(e.to_string()))
    }
}

fn parse_payload(payload: Option<&str>) -> Result<Value, CliError> {
    match payload {
        None => Ok(Value::Null),
        Some(text) => {
            serde_json::from_str(text).map_err(|e| CliError::Other(format!("invalid --payload JSON: {e}")))
        }
    }
}

fn post(url: &str, body: &Value) -> Result<Value, CliError> {
    match ureq::post(url).send_json(body.clone()) {
        Ok(response) => response
            .into_json()
            .map_err(|e| CliError::Other(format!("invalid response body: {e}"))),
        Err(ureq::Error::Status(status, response)) => {
            let message = response
                .into_json::<Value>()
                .ok()
                .and_then(|v| {
                    v.get("error")
                        .and_then(|e| e.get("message"))
                        .and_then(|m| m.as_str())
                        .map(str::to_string)
                })
                .unwrap_or_else(|| format!("request failed with status {status}"));
            Err(CliError::Http(status, message))
        }
        Err(e) => Err(CliError::Other(e.to_string())),
    }
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(_) => println!("{value}"),
    }
}

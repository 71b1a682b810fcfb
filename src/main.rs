//! protomut CLI entrypoint.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use protomut::{Config, JsonCodec, Message, MessageCodec, Mutator, ProtomutError, SchemaDoc, SchemaRef};

#[derive(Debug, Parser)]
#[command(name = "protomut")]
#[command(about = "schema-driven structure-aware mutation for fuzzing")]
struct Cli {
    /// Path to config file. Missing configs are treated as "defaults".
    #[arg(long, global = true, default_value = "protomut.toml")]
    config: PathBuf,

    /// Log level.
    #[arg(long, global = true, default_value = "warn")]
    log: String,

    /// Machine-readable output to stdout (JSON).
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print a freshly initialized instance of a message type
    Init {
        #[arg(long)]
        schema: PathBuf,

        /// Message type; defaults to the schema's root.
        #[arg(long)]
        root: Option<String>,

        /// Override the configured maximum depth.
        #[arg(long)]
        max_depth: Option<usize>,
    },

    /// Mutate an instance, optionally several times from one engine
    Mutate {
        #[arg(long)]
        schema: PathBuf,

        #[arg(long)]
        root: Option<String>,

        #[arg(long)]
        input: PathBuf,

        #[arg(long, default_value_t = 0)]
        seed: u32,

        /// Size increase hint (bytes) per mutate call.
        #[arg(long, default_value_t = 64)]
        hint: usize,

        #[arg(long, default_value_t = 1)]
        runs: u32,

        /// Write the result here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Print the elementary mutations of each call.
        #[arg(long)]
        show_log: bool,
    },

    /// Recombine two instances of the same type
    Crossover {
        #[arg(long)]
        schema: PathBuf,

        #[arg(long)]
        root: Option<String>,

        a: PathBuf,

        b: PathBuf,

        #[arg(long, default_value_t = 0)]
        seed: u32,

        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Check an instance against its schema
    Validate {
        #[arg(long)]
        schema: PathBuf,

        #[arg(long)]
        root: Option<String>,

        #[arg(long)]
        input: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse_from(normalize_global_args(std::env::args()));

    if let Err(err) = init_tracing(&cli.log) {
        // Tracing is best-effort; if it fails, we still continue.
        eprintln!("warning: failed to init tracing: {err:#}");
    }

    let config = Config::load_optional(&cli.config);

    match run_command(&cli, &config) {
        Ok(code) => code,
        Err(err) => print_error_and_exit(&cli, err),
    }
}

fn normalize_global_args(args: impl IntoIterator<Item = String>) -> Vec<String> {
    let all: Vec<String> = args.into_iter().collect();
    if all.is_empty() {
        return all;
    }

    let mut globals = Vec::new();
    let mut rest = Vec::new();

    let mut i = 1usize;
    while i < all.len() {
        let arg = &all[i];
        match arg.as_str() {
            "--json" => {
                globals.push(arg.clone());
                i += 1;
            }
            "--config" | "--log" => {
                globals.push(arg.clone());
                if i + 1 < all.len() {
                    globals.push(all[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ if arg.starts_with("--config=") || arg.starts_with("--log=") => {
                globals.push(arg.clone());
                i += 1;
            }
            _ => {
                rest.push(arg.clone());
                i += 1;
            }
        }
    }

    let mut normalized = Vec::with_capacity(all.len());
    normalized.push(all[0].clone());
    normalized.extend(globals);
    normalized.extend(rest);
    normalized
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("{err}"))?;
    Ok(())
}

fn run_command(cli: &Cli, config: &Config) -> anyhow::Result<ExitCode> {
    match &cli.command {
        Command::Init { schema, root, max_depth } => {
            let schema = load_schema(schema, root.as_deref())?;
            let max_depth = max_depth.unwrap_or(config.max_depth);
            let mut msg = Message::new(schema);
            protomut::initialize_message(&mut msg, max_depth).context("initialize message")?;
            emit_message(cli, &msg, None)?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Mutate {
            schema,
            root,
            input,
            seed,
            hint,
            runs,
            out,
            show_log,
        } => {
            let schema = load_schema(schema, root.as_deref())?;
            let codec = JsonCodec::new(schema);
            let mut msg = read_message(&codec, input)?;
            let mut engine = Mutator::with_config(*seed, config.clone());
            let mut log = Vec::new();
            for run in 0..*runs {
                engine
                    .mutate(&mut msg, *hint)
                    .with_context(|| format!("mutate run {run}"))?;
                if *show_log {
                    log.extend(engine.last_mutations().iter().cloned().map(|r| (run, r)));
                }
            }
            if *show_log {
                if cli.json {
                    let records: Vec<_> = log
                        .iter()
                        .map(|(run, r)| serde_json::json!({ "run": run, "path": r.path, "op": r.op }))
                        .collect();
                    eprintln!("{}", serde_json::to_string(&records)?);
                } else {
                    for (run, r) in &log {
                        eprintln!("run {run}: {} {}", r.path, serde_json::to_string(&r.op)?);
                    }
                }
            }
            emit_message(cli, &msg, out.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Crossover {
            schema,
            root,
            a,
            b,
            seed,
            out,
        } => {
            let schema = load_schema(schema, root.as_deref())?;
            let codec = JsonCodec::new(schema);
            let a = read_message(&codec, a)?;
            let b = read_message(&codec, b)?;
            let mut engine = Mutator::with_config(*seed, config.clone());
            let merged = engine.cross_over_into(&a, &b).context("cross over")?;
            emit_message(cli, &merged, out.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Validate { schema, root, input } => {
            let schema = load_schema(schema, root.as_deref())?;
            let codec = JsonCodec::new(schema);
            let bytes = std::fs::read(input).with_context(|| format!("read {}", input.display()))?;
            let outcome = codec
                .decode(&bytes)
                .and_then(|msg| msg.validate(config.max_depth, config.allow_out_of_range_enums));
            match outcome {
                Ok(()) => {
                    print_status(cli, "ok", None);
                    Ok(ExitCode::SUCCESS)
                }
                Err(err @ (ProtomutError::SchemaViolation(_) | ProtomutError::Codec(_) | ProtomutError::Json(_))) => {
                    print_status(cli, "invalid", Some(&err.to_string()));
                    Ok(ExitCode::from(1))
                }
                Err(err) => Err(err.into()),
            }
        }
    }
}

fn load_schema(path: &Path, root: Option<&str>) -> anyhow::Result<SchemaRef> {
    let doc = SchemaDoc::load(path).with_context(|| format!("load schema {}", path.display()))?;
    Ok(doc.root_ref(root)?)
}

fn read_message(codec: &JsonCodec, path: &Path) -> anyhow::Result<Message> {
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    codec
        .decode(&bytes)
        .with_context(|| format!("decode {} as {}", path.display(), codec.schema().name()))
}

fn emit_message(cli: &Cli, msg: &Message, out: Option<&Path>) -> anyhow::Result<()> {
    let json = JsonCodec::to_json(msg);
    let text = if cli.json {
        serde_json::to_string(&json)?
    } else {
        serde_json::to_string_pretty(&json)?
    };
    match out {
        Some(path) => {
            std::fs::write(path, text.as_bytes()).with_context(|| format!("write {}", path.display()))?;
            print_status(cli, "ok", Some(&path.display().to_string()));
        }
        None => println!("{text}"),
    }
    Ok(())
}

fn print_status(cli: &Cli, status: &str, detail: Option<&str>) {
    if cli.json {
        let out = serde_json::json!({ "status": status, "detail": detail });
        println!("{out}");
    } else {
        match detail {
            Some(detail) => println!("{status}: {detail}"),
            None => println!("{status}"),
        }
    }
}

fn print_error_and_exit(cli: &Cli, err: anyhow::Error) -> ExitCode {
    let msg = format!("{err:#}");
    if cli.json {
        let out = serde_json::json!({
            "status": "error",
            "code": "error",
            "message": msg,
        });
        println!("{out}");
    } else {
        eprintln!("{msg}");
    }
    ExitCode::from(2)
}

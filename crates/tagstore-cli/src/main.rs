//! tagstore CLI tool
//!
//! Works directly on a local tag database.
//!
//! Usage:
//!   tagstore add <subject> <predicate> <object>
//!   tagstore remove <subject> <predicate> <object>
//!   tagstore auto <subject> <predicate> <object>
//!   tagstore objects <subject> <predicate> [-i]
//!   tagstore subjects <object> <predicate> [-i]
//!   tagstore suggestions <subject> <predicate>
//!   tagstore intersect <predicate> <object>... [-i]
//!   tagstore statements <subject> [-i]
//!   tagstore clock <public_key> <subject> <predicate> <object>
//!   tagstore gossip [--sample]
//!   tagstore ingest <file.jsonl>
//!   tagstore stats
//!   tagstore misc <name> [value]

use serde::Serialize;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tagstore_core::{Operation, Predicate, PublicKey, SignedOperation};
use tagstore_db::{TableCounts, TagDatabase, TagDbConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// A parsed command line.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Vote {
        subject: String,
        predicate: Predicate,
        object: String,
        operation: Operation,
    },
    Auto {
        subject: String,
        predicate: Predicate,
        object: String,
    },
    Objects {
        subject: String,
        predicate: Predicate,
        case_sensitive: bool,
    },
    Subjects {
        object: String,
        predicate: Predicate,
        case_sensitive: bool,
    },
    Suggestions {
        subject: String,
        predicate: Predicate,
    },
    Intersect {
        predicate: Predicate,
        objects: Vec<String>,
        case_sensitive: bool,
    },
    Statements {
        subject: String,
        case_sensitive: bool,
    },
    Clock {
        public_key: PublicKey,
        subject: String,
        predicate: Predicate,
        object: String,
    },
    Gossip {
        sample: bool,
    },
    Ingest {
        path: PathBuf,
    },
    Stats,
    Misc {
        name: String,
        value: Option<String>,
    },
    Help,
}

#[derive(Serialize)]
struct Stats {
    public_key: String,
    data_dir: PathBuf,
    #[serde(flatten)]
    counts: TableCounts,
}

fn print_usage() {
    eprintln!("tagstore - Inspect and edit a local tag database");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  tagstore add <subject> <predicate> <object>          Add a local opinion");
    eprintln!("  tagstore remove <subject> <predicate> <object>       Retract a local opinion");
    eprintln!("  tagstore auto <subject> <predicate> <object>         Seed an auto-generated statement");
    eprintln!("  tagstore objects <subject> <predicate> [-i]          Shown objects of a subject");
    eprintln!("  tagstore subjects <object> <predicate> [-i]          Shown subjects of an object");
    eprintln!("  tagstore suggestions <subject> <predicate>           Objects not shown yet");
    eprintln!("  tagstore intersect <predicate> <object>... [-i]      Subjects shown for all objects");
    eprintln!("  tagstore statements <subject> [-i]                   Shown statements of a subject");
    eprintln!("  tagstore clock <public_key> <subject> <pred> <obj>   Stored clock of a peer");
    eprintln!("  tagstore gossip [--sample]                           Print gossip-ready operations");
    eprintln!("  tagstore ingest <file.jsonl>                         Apply signed remote operations");
    eprintln!("  tagstore stats                                       Table counts and identity");
    eprintln!("  tagstore misc <name> [value]                         Read or write metadata");
    eprintln!();
    eprintln!("  -i  case-insensitive match");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  TAGSTORE_DATA_DIR             Database directory (default: ./tagstore-data)");
    eprintln!("  TAGSTORE_GOSSIP_MIN_AGE_SECS  Minimum age for gossip (default: 60)");
    eprintln!("  TAGSTORE_GOSSIP_COUNT         Sample size for gossip --sample (default: 10)");
    eprintln!("  TAGSTORE_SAMPLE_ATTEMPTS      Probe budget for sampling (default: 100)");
    eprintln!("  RUST_LOG                      Log filter (default: tagstore=info)");
}

fn predicate(raw: &str) -> Result<Predicate, String> {
    raw.parse().map_err(|e: tagstore_core::Error| e.to_string())
}

fn is_insensitive_flag(arg: &str) -> bool {
    arg == "-i" || arg == "--insensitive"
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    let Some((cmd, rest)) = args.split_first() else {
        return Err("missing command".into());
    };

    let case_sensitive = !rest.iter().any(|a| is_insensitive_flag(a));
    let positional: Vec<&str> = rest
        .iter()
        .map(String::as_str)
        .filter(|a| !is_insensitive_flag(a) && *a != "--sample")
        .collect();
    let need = |count: usize, shape: &str| {
        if positional.len() < count {
            Err(format!("{cmd} requires {shape}"))
        } else {
            Ok(())
        }
    };

    let command = match cmd.as_str() {
        "add" | "remove" => {
            need(3, "<subject> <predicate> <object>")?;
            Command::Vote {
                subject: positional[0].to_string(),
                predicate: predicate(positional[1])?,
                object: positional[2].to_string(),
                operation: if cmd == "add" {
                    Operation::Add
                } else {
                    Operation::Remove
                },
            }
        }
        "auto" => {
            need(3, "<subject> <predicate> <object>")?;
            Command::Auto {
                subject: positional[0].to_string(),
                predicate: predicate(positional[1])?,
                object: positional[2].to_string(),
            }
        }
        "objects" => {
            need(2, "<subject> <predicate>")?;
            Command::Objects {
                subject: positional[0].to_string(),
                predicate: predicate(positional[1])?,
                case_sensitive,
            }
        }
        "subjects" => {
            need(2, "<object> <predicate>")?;
            Command::Subjects {
                object: positional[0].to_string(),
                predicate: predicate(positional[1])?,
                case_sensitive,
            }
        }
        "suggestions" => {
            need(2, "<subject> <predicate>")?;
            Command::Suggestions {
                subject: positional[0].to_string(),
                predicate: predicate(positional[1])?,
            }
        }
        "intersect" => {
            need(2, "<predicate> <object>...")?;
            Command::Intersect {
                predicate: predicate(positional[0])?,
                objects: positional[1..].iter().map(|s| s.to_string()).collect(),
                case_sensitive,
            }
        }
        "statements" => {
            need(1, "<subject>")?;
            Command::Statements {
                subject: positional[0].to_string(),
                case_sensitive,
            }
        }
        "clock" => {
            need(4, "<public_key> <subject> <predicate> <object>")?;
            Command::Clock {
                public_key: PublicKey::from_hex(positional[0]).map_err(|e| e.to_string())?,
                subject: positional[1].to_string(),
                predicate: predicate(positional[2])?,
                object: positional[3].to_string(),
            }
        }
        "gossip" => Command::Gossip {
            sample: rest.iter().any(|a| a == "--sample"),
        },
        "ingest" => {
            need(1, "<file.jsonl>")?;
            Command::Ingest {
                path: PathBuf::from(positional[0]),
            }
        }
        "stats" => Command::Stats,
        "misc" => {
            need(1, "<name>")?;
            Command::Misc {
                name: positional[0].to_string(),
                value: positional.get(1).map(|s| s.to_string()),
            }
        }
        "-h" | "--help" | "help" => Command::Help,
        other => return Err(format!("Unknown command: {other}")),
    };
    Ok(command)
}

fn print_lines(items: impl IntoIterator<Item = String>) {
    let mut empty = true;
    for item in items {
        println!("{item}");
        empty = false;
    }
    if empty {
        println!("(none)");
    }
}

/// Read signed operations, one JSON object per line. Bad lines and bad
/// signatures are skipped with a warning.
fn read_batch(path: &Path) -> Result<Vec<SignedOperation>, Box<dyn std::error::Error>> {
    let reader = BufReader::new(std::fs::File::open(path)?);
    let mut batch = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let signed: SignedOperation = match serde_json::from_str(&line) {
            Ok(signed) => signed,
            Err(e) => {
                tracing::warn!("Skipping line {}: {}", index + 1, e);
                continue;
            }
        };
        if let Err(e) = signed.verify() {
            tracing::warn!(
                "Rejecting operation on line {} from {}: {}",
                index + 1,
                signed.operation.creator_public_key,
                e
            );
            continue;
        }
        batch.push(signed);
    }
    Ok(batch)
}

fn run(db: &TagDatabase, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Vote {
            subject,
            predicate,
            object,
            operation,
        } => {
            let signed = db.add_local_operation(&subject, predicate, &object, operation)?;
            println!("{}", serde_json::to_string(&signed)?);
        }
        Command::Auto {
            subject,
            predicate,
            object,
        } => {
            let outcome = db.add_auto_generated(&subject, predicate, &object)?;
            println!("{outcome}");
        }
        Command::Objects {
            subject,
            predicate,
            case_sensitive,
        } => print_lines(db.get_objects(&subject, predicate, case_sensitive)?),
        Command::Subjects {
            object,
            predicate,
            case_sensitive,
        } => print_lines(db.get_subjects(&object, predicate, case_sensitive)?),
        Command::Suggestions { subject, predicate } => {
            print_lines(db.get_suggestions(&subject, predicate)?)
        }
        Command::Intersect {
            predicate,
            objects,
            case_sensitive,
        } => print_lines(db.get_subjects_intersection(objects.as_slice(), predicate, case_sensitive)?),
        Command::Statements {
            subject,
            case_sensitive,
        } => print_lines(
            db.get_statements(&subject, case_sensitive)?
                .into_iter()
                .map(|s| format!("{}\t{}\t{}", s.subject, s.predicate, s.object)),
        ),
        Command::Clock {
            public_key,
            subject,
            predicate,
            object,
        } => println!("{}", db.get_clock(&public_key, &subject, predicate, &object)?),
        Command::Gossip { sample } => {
            let config = db.config();
            let rows = if sample {
                db.sample_operations_for_gossip(config.gossip_min_age, config.gossip_count)?
            } else {
                db.get_operations_for_gossip(config.gossip_min_age)?
            };
            for signed in db.signed_operations(&rows)? {
                println!("{}", serde_json::to_string(&signed)?);
            }
        }
        Command::Ingest { path } => {
            let batch = read_batch(&path)?;
            let report = db.add_remote_operations(&batch)?;
            println!("{}", serde_json::to_string(&report)?);
        }
        Command::Stats => {
            let stats = Stats {
                public_key: db.local_public_key().to_hex(),
                data_dir: db.config().data_dir.clone(),
                counts: db.table_counts()?,
            };
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Misc { name, value: None } => match db.get_misc(&name)? {
            Some(value) => println!("{value}"),
            None => println!("(none)"),
        },
        Command::Misc {
            name,
            value: Some(value),
        } => db.set_misc(&name, &value)?,
        Command::Help => print_usage(),
    }
    Ok(())
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tagstore=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(Command::Help) => {
            print_usage();
            return;
        }
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {e}");
            print_usage();
            std::process::exit(1);
        }
    };

    let result = TagDbConfig::from_env()
        .and_then(TagDatabase::open)
        .map_err(Into::into)
        .and_then(|db| run(&db, command));
    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

#![forbid(unsafe_code)]

use serde_json::{Value, json};
use soi_core::clock::ts_ms_to_rfc3339;
use soi_core::ids::{IdError, ProjectId, RecordId, UserId};
use soi_core::{EventFilter, SortOrder};
use soi_service::{Service, ServiceConfig, ServiceError};

const VALUE_FLAGS: &[&str] = &["--storage-dir", "--project", "--user", "--record"];

fn usage() -> &'static str {
    "soi_admin - read-only inspection of a soi store\n\n\
USAGE:\n\
  soi_admin [--storage-dir DIR] [--verbose] <COMMAND>\n\
\n\
COMMANDS:\n\
  users                                      List registered users\n\
  projects                                   List projects\n\
  records --project N                        List records of a project\n\
  status --project N                         Tag usage of a project\n\
  events [--user N|--project N|--record N] [--desc]\n\
                                             Audit log, oldest first unless --desc\n\
\n\
ENV:\n\
  SOI_STORAGE_DIR   Storage directory (default ./.soi)\n\
  SOI_IMAGES_DIR    Image directory (default <storage>/images)\n\
  RUST_LOG          Log filter (default warn)\n"
}

#[derive(Debug)]
enum AdminError {
    Usage(String),
    Service(ServiceError),
    Json(serde_json::Error),
}

impl std::fmt::Display for AdminError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Usage(message) => write!(f, "{message}"),
            Self::Service(err) => write!(f, "{} ({})", err, err.code()),
            Self::Json(err) => write!(f, "json: {err}"),
        }
    }
}

impl std::error::Error for AdminError {}

impl From<ServiceError> for AdminError {
    fn from(value: ServiceError) -> Self {
        Self::Service(value)
    }
}

impl From<serde_json::Error> for AdminError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

struct Flags {
    command: Option<String>,
    verbose: bool,
    descending: bool,
    project: Option<String>,
    user: Option<String>,
    record: Option<String>,
}

fn parse_flags(args: &[String]) -> Result<Flags, AdminError> {
    let mut flags = Flags {
        command: None,
        verbose: false,
        descending: false,
        project: None,
        user: None,
        record: None,
    };
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let arg = arg.as_str();
        if VALUE_FLAGS.contains(&arg) {
            let value = iter
                .next()
                .cloned()
                .ok_or_else(|| AdminError::Usage(format!("{arg} needs a value")))?;
            match arg {
                "--project" => flags.project = Some(value),
                "--user" => flags.user = Some(value),
                "--record" => flags.record = Some(value),
                _ => {}
            }
            continue;
        }
        match arg {
            "--verbose" | "-v" => flags.verbose = true,
            "--desc" => flags.descending = true,
            _ if arg.starts_with("--storage-dir=") => {}
            _ if arg.starts_with('-') => {
                return Err(AdminError::Usage(format!("unknown flag {arg}")));
            }
            _ if flags.command.is_none() => flags.command = Some(arg.to_string()),
            _ => return Err(AdminError::Usage(format!("unexpected argument {arg}"))),
        }
    }
    Ok(flags)
}

fn parse_id<T>(
    flag: &str,
    raw: Option<&str>,
    parse: fn(&str) -> Result<T, IdError>,
) -> Result<T, AdminError> {
    let raw = raw.ok_or_else(|| AdminError::Usage(format!("{flag} N is required")))?;
    parse(raw).map_err(|err| AdminError::Usage(format!("{flag}: {}", err.message())))
}

fn event_filter(flags: &Flags) -> Result<Option<EventFilter>, AdminError> {
    let given = [&flags.user, &flags.project, &flags.record]
        .iter()
        .filter(|v| v.is_some())
        .count();
    if given > 1 {
        return Err(AdminError::Usage(
            "events takes at most one of --user, --project, --record".to_string(),
        ));
    }
    if flags.user.is_some() {
        let id = parse_id("--user", flags.user.as_deref(), UserId::parse)?;
        return Ok(Some(EventFilter::User(id)));
    }
    if flags.project.is_some() {
        let id = parse_id("--project", flags.project.as_deref(), ProjectId::parse)?;
        return Ok(Some(EventFilter::Project(id)));
    }
    if flags.record.is_some() {
        let id = parse_id("--record", flags.record.as_deref(), RecordId::parse)?;
        return Ok(Some(EventFilter::Record(id)));
    }
    Ok(None)
}

fn run(service: &Service, flags: &Flags) -> Result<Value, AdminError> {
    let command = flags.command.as_deref().unwrap_or_default();
    let out = match command {
        "users" => json!({ "users": service.list_users()? }),
        "projects" => json!({ "projects": service.list_projects()? }),
        "records" => {
            let id = parse_id("--project", flags.project.as_deref(), ProjectId::parse)?;
            json!({ "records": service.list_project_records(id)? })
        }
        "status" => {
            let id = parse_id("--project", flags.project.as_deref(), ProjectId::parse)?;
            serde_json::to_value(service.project_status(id)?)?
        }
        "events" => {
            let order = if flags.descending {
                SortOrder::Descending
            } else {
                SortOrder::Ascending
            };
            let mut events = Vec::new();
            for event in service.events(event_filter(flags)?, order)? {
                let created_at = ts_ms_to_rfc3339(event.created_at_ms);
                let mut value = serde_json::to_value(event)?;
                if let Some(map) = value.as_object_mut() {
                    map.insert("created_at".to_string(), Value::String(created_at));
                }
                events.push(value);
            }
            json!({ "events": events })
        }
        "" => return Err(AdminError::Usage("missing command".to_string())),
        other => return Err(AdminError::Usage(format!("unknown command {other}"))),
    };
    Ok(out)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    if args
        .iter()
        .any(|arg| matches!(arg.as_str(), "-h" | "--help"))
    {
        print!("{}", usage());
        return Ok(());
    }

    let flags = parse_flags(&args)?;
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if flags.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let config = ServiceConfig::from_env();
    log::debug!("storage dir {}", config.storage_dir.display());
    let service = Service::open(&config)?;

    let out = run(&service, &flags)?;
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

use std::fs;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

use metadata_registration::config::{ConfigLoader, ResolvedConfig};
use metadata_registration::converter::FormatConverter;
use metadata_registration::error::RegistrationError;
use metadata_registration::mapper::PropertyMapper;
use metadata_registration::normalize::{
    denormalize_all, denormalized_table, expand_embedded_json, flatten_with_prefix,
};
use metadata_registration::output::JsonOutput;
use metadata_registration::properties::{PropertyHttpClient, load_mapper};
use metadata_registration::reconcile::reconcile;
use metadata_registration::steps::StepKind;
use metadata_registration::validation::{FormSet, validate_record};

#[derive(Parser)]
#[command(name = "mreg")]
#[command(about = "Convert, normalize and reconcile metadata registration records")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    fetch_properties: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Convert a record from API format to form format")]
    ToForm(InputArgs),
    #[command(about = "Convert a record from form format to API format")]
    ToApi(InputArgs),
    #[command(about = "Drop empty values from a record in form format")]
    Clean(InputArgs),
    #[command(about = "Flatten nested maps into one level")]
    Flatten(InputArgs),
    #[command(about = "Expand list-valued fields into one row per element")]
    Denormalize(DenormalizeArgs),
    #[command(about = "Replace JSON-encoded string fields by their keys")]
    ExpandJson(InputArgs),
    #[command(about = "Reuse identifiers of existing sample entities in new samples")]
    Reconcile(ReconcileArgs),
    #[command(about = "Validate sample records against step forms")]
    Validate(ValidateArgs),
}

#[derive(Args)]
struct InputArgs {
    input: Utf8PathBuf,
}

#[derive(Args)]
struct DenormalizeArgs {
    input: Utf8PathBuf,

    #[arg(long = "field", required = true)]
    fields: Vec<String>,

    #[arg(long)]
    table: bool,
}

#[derive(Args)]
struct ReconcileArgs {
    new: Utf8PathBuf,

    #[arg(long)]
    existing: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct ValidateArgs {
    input: Utf8PathBuf,

    #[arg(long)]
    forms: Utf8PathBuf,

    #[arg(long = "step")]
    steps: Vec<StepKind>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<RegistrationError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &RegistrationError) -> u8 {
    match error {
        RegistrationError::UnknownProperty(_)
        | RegistrationError::NotFound { .. }
        | RegistrationError::UnknownStep(_)
        | RegistrationError::MissingReference { .. }
        | RegistrationError::ValidationFailed { .. }
        | RegistrationError::MissingConfig => 2,
        RegistrationError::PropertyHttp(_) | RegistrationError::PropertyStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::ToForm(args) => {
            let mapper = resolve_mapper(&config, cli.fetch_properties)?;
            let data = read_json(&args.input)?;
            let converter = FormatConverter::from_api(&mapper, config.layout.clone(), &data)?;
            print(&converter.to_form())
        }
        Commands::ToApi(args) => {
            let mapper = resolve_mapper(&config, cli.fetch_properties)?;
            let data = read_json(&args.input)?;
            let converter = FormatConverter::from_form(&mapper, config.layout.clone(), &data)?;
            print(&converter.to_api())
        }
        Commands::Clean(args) => {
            let mapper = resolve_mapper(&config, cli.fetch_properties)?;
            let data = read_json(&args.input)?;
            let mut converter = FormatConverter::from_form(&mapper, config.layout.clone(), &data)?;
            let discarded = converter.clean_data();
            info!(discarded = discarded.len(), "removed empty entries");
            print(&converter.to_form())
        }
        Commands::Flatten(args) => {
            let options = &config.normalize;
            let rows: Vec<Value> = read_objects(&args.input)?
                .iter()
                .map(|record| {
                    Value::Object(flatten_with_prefix(
                        record,
                        &options.initial_parent_key,
                        &options.separator,
                        options.use_parent_key,
                    ))
                })
                .collect();
            print(&rows)
        }
        Commands::Denormalize(args) => {
            let records = read_objects(&args.input)?;
            if args.table {
                let table = denormalized_table(&records, &args.fields, &config.normalize)?;
                print(&table)
            } else {
                let rows = denormalize_all(&records, &args.fields)?;
                print(&rows)
            }
        }
        Commands::ExpandJson(args) => {
            let rows: Vec<Value> = read_objects(&args.input)?
                .iter()
                .map(|record| Value::Object(expand_embedded_json(record, &config.json_fields)))
                .collect();
            print(&rows)
        }
        Commands::Reconcile(args) => {
            let new = read_list(&args.new)?;
            let existing = match &args.existing {
                Some(path) => read_list(path)?,
                None => Vec::new(),
            };
            print(&reconcile(&existing, &new))
        }
        Commands::Validate(args) => {
            let forms: FormSet = serde_json::from_value(read_json(&args.forms)?)
                .map_err(|err| malformed(&args.forms, err))?;
            let steps = if args.steps.is_empty() {
                vec![
                    StepKind::TreatmentIndividual,
                    StepKind::Individual,
                    StepKind::TreatmentSample,
                    StepKind::Sample,
                ]
            } else {
                args.steps
            };
            let records = read_list(&args.input)?;
            for record in &records {
                validate_record(record, &steps, &forms)?;
            }
            info!(records = records.len(), "all records validated");
            Ok(())
        }
    }
}

fn resolve_mapper(config: &ResolvedConfig, fetch: bool) -> miette::Result<PropertyMapper> {
    if !fetch {
        return Ok(config.mapper.clone());
    }
    let endpoint = config.property_endpoint.as_deref().ok_or_else(|| {
        RegistrationError::Configuration("property_endpoint is not set".to_string())
    })?;
    let client = PropertyHttpClient::new(endpoint)?;
    Ok(load_mapper(&client)?)
}

fn print<T: serde::Serialize + ?Sized>(value: &T) -> miette::Result<()> {
    JsonOutput::print_json(value)
        .map_err(|err| RegistrationError::Filesystem(err.to_string()).into())
}

fn malformed(path: &Utf8PathBuf, err: impl std::fmt::Display) -> RegistrationError {
    RegistrationError::MalformedValue {
        property: path.to_string(),
        reason: err.to_string(),
    }
}

fn read_json(path: &Utf8PathBuf) -> Result<Value, RegistrationError> {
    let content = fs::read_to_string(path)
        .map_err(|err| RegistrationError::Filesystem(format!("{path}: {err}")))?;
    serde_json::from_str(&content).map_err(|err| malformed(path, err))
}

fn read_list(path: &Utf8PathBuf) -> Result<Vec<Value>, RegistrationError> {
    match read_json(path)? {
        Value::Array(items) => Ok(items),
        other => Ok(vec![other]),
    }
}

fn read_objects(path: &Utf8PathBuf) -> Result<Vec<Map<String, Value>>, RegistrationError> {
    read_list(path)?
        .into_iter()
        .map(|item| match item {
            Value::Object(map) => Ok(map),
            _ => Err(malformed(path, "expected JSON objects")),
        })
        .collect()
}

use std::{
    io::Write,
    path::{
        Path,
        PathBuf,
    },
    str::FromStr,
    sync::Arc,
};

use ardulog_dataflash::{
    InstanceKey,
    Log,
    ParseOptions,
    Summary,
};
use clap::{
    Parser,
    Subcommand,
};
use color_eyre::eyre::{
    Error,
    bail,
    eyre,
};
use futures_util::{
    StreamExt,
    stream,
};
use serde::Serialize;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let _ = dotenvy::dotenv();
    color_eyre::install()?;
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    match args.command {
        Command::Stats { file, parse } => {
            let log = load_log(&file, parse.options()).await?;
            let mut stdout = std::io::stdout().lock();

            writeln!(stdout, "{:<8} {:>10} {:>12} {:>6}", "type", "count", "size", "msg")?;
            for (name, stats) in log.stats() {
                writeln!(
                    stdout,
                    "{name:<8} {:>10} {:>12} {:>6}",
                    stats.count, stats.size, stats.msg_size
                )?;
            }

            let diagnostics = log.diagnostics();
            writeln!(stdout)?;
            writeln!(stdout, "total bytes:     {}", diagnostics.num_bytes)?;
            writeln!(stdout, "records:         {}", diagnostics.num_records)?;
            writeln!(stdout, "skipped bytes:   {}", diagnostics.skipped_bytes)?;
            writeln!(stdout, "truncated bytes: {}", diagnostics.truncated_bytes)?;
            if diagnostics.rejected_formats > 0 {
                writeln!(stdout, "rejected FMT:    {}", diagnostics.rejected_formats)?;
            }
            for (type_code, count) in &diagnostics.unknown_types {
                writeln!(stdout, "unknown type {type_code:#04x}: {count}")?;
            }
        }
        Command::Types { file, parse } => {
            let log = load_log(&file, parse.options()).await?;
            let mut stdout = std::io::stdout().lock();

            for name in log.available_types() {
                let message_type = log.message_type(name)?;

                write!(stdout, "{name}")?;
                if let Some(instance_field) = message_type.instance_field {
                    let instances = message_type
                        .instances
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>();
                    write!(stdout, " [{instance_field}: {}]", instances.join(", "))?;
                }
                writeln!(stdout)?;

                for column in &message_type.columns {
                    write!(stdout, "    {:<12} {}", column.name, column.format)?;
                    if let Some(unit) = column.unit {
                        write!(stdout, " {unit}")?;
                    }
                    if let Some(multiplier) = column.multiplier {
                        write!(stdout, " x{multiplier}")?;
                    }
                    writeln!(stdout)?;
                }
            }
        }
        Command::Get {
            file,
            name,
            field,
            instance,
            pretty,
            parse,
        } => {
            let options = parse.options();
            let log = load_log(&file, options).await?;

            let table = match &instance {
                Some(instance) => log.table_instance(&name, InstanceKey::from(instance.as_str()))?,
                None => log.table(&name)?,
            };

            let mut stdout = std::io::stdout().lock();
            match &field {
                Some(field) => {
                    let column = table.column(field).ok_or_else(|| {
                        eyre!("message type {name} has no field {field}")
                    })?;
                    write_json(&mut stdout, column, pretty)?;
                }
                None => write_json(&mut stdout, table, pretty)?,
            }
        }
        Command::Info { file, json, parse } => {
            let log = load_log(&file, parse.options()).await?;
            let summary = Summary::from_log(&log);
            let mut stdout = std::io::stdout().lock();

            if json {
                write_json(&mut stdout, &summary, true)?;
            }
            else {
                let or_dash = |value: Option<String>| value.unwrap_or_else(|| "-".to_owned());
                let version = &summary.version;

                writeln!(stdout, "size:              {} bytes", summary.num_bytes)?;
                writeln!(
                    stdout,
                    "start time:        {}",
                    or_dash(summary.start_time.map(|time| time.to_rfc3339()))
                )?;
                writeln!(stdout, "firmware:          {}", or_dash(version.fw_string.clone()))?;
                writeln!(stdout, "git hash:          {}", or_dash(version.fw_hash.clone()))?;
                writeln!(
                    stdout,
                    "vehicle:           {}",
                    or_dash(version.vehicle_name().map(ToOwned::to_owned))
                )?;
                writeln!(stdout, "os:                {}", or_dash(version.os_string.clone()))?;
                writeln!(
                    stdout,
                    "flight controller: {}",
                    or_dash(version.flight_controller.clone())
                )?;
                writeln!(
                    stdout,
                    "board id:          {}",
                    or_dash(version.board_id.map(|id| id.to_string()))
                )?;
                writeln!(
                    stdout,
                    "flight time:       {}",
                    or_dash(
                        summary
                            .flight_time
                            .map(|duration| humantime::format_duration(duration).to_string())
                    )
                )?;
                writeln!(stdout, "parameters:        {}", summary.num_parameters)?;
                writeln!(stdout, "message types:     {}", summary.num_types)?;
            }
        }
        Command::Scan {
            directory,
            jobs,
            json,
            parse,
        } => {
            scan(&directory, jobs, json, parse.options()).await?;
        }
    }

    Ok(())
}

#[derive(Debug, Parser)]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Record counts and sizes per message type.
    Stats {
        /// Log file, or `-` for stdin.
        file: PathBuf,

        #[clap(flatten)]
        parse: ParseArgs,
    },
    /// Message types with their columns and instances.
    Types {
        /// Log file, or `-` for stdin.
        file: PathBuf,

        #[clap(flatten)]
        parse: ParseArgs,
    },
    /// Export a message type as JSON.
    Get {
        /// Log file, or `-` for stdin.
        file: PathBuf,

        /// Message type, e.g. `GPS` or `BAT[1]`.
        name: String,

        /// Only export this field.
        #[clap(short, long)]
        field: Option<String>,

        /// Instance to export.
        ///
        /// Defaults to the first.
        #[clap(short, long)]
        instance: Option<String>,

        #[clap(long)]
        pretty: bool,

        #[clap(flatten)]
        parse: ParseArgs,
    },
    /// Firmware, start time and flight time.
    Info {
        /// Log file, or `-` for stdin.
        file: PathBuf,

        #[clap(long)]
        json: bool,

        #[clap(flatten)]
        parse: ParseArgs,
    },
    /// Summarize all `.bin` logs in a directory.
    Scan {
        directory: PathBuf,

        /// Number of logs to decode concurrently.
        #[clap(short, long, default_value = "4")]
        jobs: usize,

        /// Print one JSON object per log.
        #[clap(long)]
        json: bool,

        #[clap(flatten)]
        parse: ParseArgs,
    },
}

#[derive(Debug, clap::Args)]
struct ParseArgs {
    /// Only decode these message types.
    #[clap(long, env = "ARDULOG_ONLY", value_delimiter = ',')]
    only: Vec<String>,

    /// Apply the multipliers declared by FMTU records.
    #[clap(long, env = "ARDULOG_DECLARED_MULTIPLIERS")]
    declared_multipliers: bool,

    /// Scale a field, e.g. `GPS.Alt=0.01`.
    #[clap(short, long)]
    multiplier: Vec<MultiplierArg>,
}

impl ParseArgs {
    fn options(&self) -> ParseOptions {
        let mut options =
            ParseOptions::new().apply_declared_multipliers(self.declared_multipliers);

        if !self.only.is_empty() {
            options = options.only(self.only.iter().cloned());
        }

        for multiplier in &self.multiplier {
            options = options.with_multiplier(
                &multiplier.name,
                &multiplier.field,
                multiplier.multiplier,
            );
        }

        options
    }
}

#[derive(Clone, Debug)]
struct MultiplierArg {
    name: String,
    field: String,
    multiplier: f64,
}

impl FromStr for MultiplierArg {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((path, multiplier)) = s.split_once('=')
        else {
            bail!("expected NAME.FIELD=MULTIPLIER: {s}");
        };
        let Some((name, field)) = path.split_once('.')
        else {
            bail!("expected NAME.FIELD=MULTIPLIER: {s}");
        };
        Ok(Self {
            name: name.to_owned(),
            field: field.to_owned(),
            multiplier: multiplier.parse()?,
        })
    }
}

async fn load_log(path: &Path, options: ParseOptions) -> Result<Log, Error> {
    if path.as_os_str() == "-" {
        tracing::debug!("reading log from stdin");
        return Ok(Log::read(tokio::io::stdin(), &options).await?);
    }

    let data = tokio::fs::read(path).await?;
    tracing::debug!(path = %path.display(), num_bytes = data.len(), "decoding log");

    // decoding a large log takes a while
    let log = tokio::task::spawn_blocking(move || Log::parse_with(&data, &options)).await??;
    Ok(log)
}

fn write_json<W: Write, T: Serialize + ?Sized>(
    mut writer: W,
    value: &T,
    pretty: bool,
) -> Result<(), Error> {
    if pretty {
        serde_json::to_writer_pretty(&mut writer, value)?;
    }
    else {
        serde_json::to_writer(&mut writer, value)?;
    }
    writeln!(writer)?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct ScanEntry<'a> {
    path: &'a Path,
    #[serde(flatten)]
    summary: &'a Summary,
}

async fn scan(directory: &Path, jobs: usize, json: bool, options: ParseOptions) -> Result<(), Error> {
    let mut paths = vec![];
    let mut entries = tokio::fs::read_dir(directory).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_log = path
            .extension()
            .is_some_and(|extension| extension.eq_ignore_ascii_case("bin"));
        if is_log && entry.file_type().await?.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    if paths.is_empty() {
        bail!("no .bin files in {}", directory.display());
    }
    tracing::info!(num_logs = paths.len(), "scanning logs");

    // every log gets its own parser, so they can be decoded in parallel.
    let options = Arc::new(options);
    let mut summaries = stream::iter(paths)
        .map(|path| {
            let options = options.clone();
            tokio::task::spawn_blocking(move || {
                let summary = std::fs::read(&path)
                    .map_err(Error::from)
                    .and_then(|data| Ok(Log::parse_with(&data, &options)?))
                    .map(|log| Summary::from_log(&log));
                (path, summary)
            })
        })
        .buffer_unordered(jobs.max(1));

    let mut stdout = std::io::stdout().lock();
    let mut num_failed = 0;

    while let Some(result) = summaries.next().await {
        let (path, summary) = result?;
        let summary = match summary {
            Ok(summary) => summary,
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "skipping log");
                num_failed += 1;
                continue;
            }
        };

        if json {
            write_json(
                &mut stdout,
                &ScanEntry {
                    path: &path,
                    summary: &summary,
                },
                false,
            )?;
        }
        else {
            writeln!(
                stdout,
                "{}  {}  {}  {}  {} bytes",
                path.display(),
                summary
                    .start_time
                    .map_or_else(|| "-".to_owned(), |time| time.to_rfc3339()),
                summary.version.fw_string.as_deref().unwrap_or("-"),
                summary.flight_time.map_or_else(
                    || "-".to_owned(),
                    |duration| humantime::format_duration(duration).to_string()
                ),
                summary.num_bytes,
            )?;
        }
    }

    if num_failed > 0 {
        tracing::warn!(num_failed, "some logs failed to load");
    }

    Ok(())
}

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, error::ErrorKind};
use parquet::basic::Compression;

use crate::aggregate::aggregate;
use crate::config::LinkStoreConfig;
use crate::constants::aggregate::DEFAULT_AGGREGATED_DIR;

#[derive(Debug, Parser)]
#[command(
    name = "aggregate_links",
    disable_help_subcommand = true,
    about = "Aggregate link record files and drop duplicates",
    long_about = "Merge every per-key link record file in the base directory into one deduplicated file per site.",
    after_help = "The base directory defaults to AUTO_BROWSING_LINKS_OUTPUT when set, otherwise links-output."
)]
struct AggregateLinksCli {
    #[arg(
        long,
        value_name = "DIR",
        help = "Input directory holding per-key record files"
    )]
    base: Option<PathBuf>,
    #[arg(
        long,
        value_name = "DIR",
        help = "Output directory (default: <base>/aggregated)"
    )]
    output: Option<PathBuf>,
}

/// Run the `aggregate_links` command line over `args_iter` (program name excluded).
pub fn run_aggregate_links<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let Some(cli) = parse_cli::<AggregateLinksCli, _>(
        std::iter::once("aggregate_links".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let base = match cli.base {
        Some(base) => base,
        None => LinkStoreConfig::from_env()?.output_dir,
    };
    let output = cli
        .output
        .unwrap_or_else(|| base.join(DEFAULT_AGGREGATED_DIR));

    let summary = aggregate(&base, &output, Compression::SNAPPY)?;
    if summary.outputs.is_empty() {
        println!("No record files aggregated from {}", base.display());
        return Ok(());
    }
    for written in &summary.outputs {
        println!("Wrote {} ({} rows)", written.path.display(), written.records);
    }
    println!(
        "Read {} file(s), skipped {}",
        summary.files_read, summary.files_skipped
    );
    Ok(())
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use console::style;

use geoconvert_core::{detect, export, export_batch, ingest, Format, IngestOutcome};

use crate::cli::{Cli, Commands, ConvertArgs, InspectArgs};

pub fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Convert(args) => convert(args),
        Commands::Inspect(args) => inspect(args),
    }
}

fn ingest_path(path: &Path) -> Result<IngestOutcome> {
    let bytes = fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
    let name = path.file_name().and_then(|n| n.to_str());
    Ok(ingest(&bytes, name)?)
}

fn report_outcome(path: &Path, outcome: &IngestOutcome) {
    println!(
        "{} {}: {} of {} features parsed",
        style("✓").green(),
        path.display(),
        outcome.parsed,
        outcome.total
    );
    for warning in &outcome.warnings {
        println!("  {} {}: {}", style("!").yellow(), warning.context, warning.message);
    }
}

fn convert(args: ConvertArgs) -> Result<()> {
    let format = Format::from_target(&args.to)?;

    let mut sources = Vec::new();
    let mut failed = 0usize;
    for path in &args.inputs {
        match ingest_path(path) {
            Ok(outcome) => {
                report_outcome(path, &outcome);
                sources.push((outcome.collection.name.clone(), outcome.collection));
            }
            Err(error) => {
                failed += 1;
                eprintln!("{} {}: {error:#}", style("✗").red(), path.display());
            }
        }
    }
    if sources.is_empty() {
        bail!("no input could be parsed ({failed} failed)");
    }

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("cannot create {}", args.out_dir.display()))?;

    let (bytes, filename) = if sources.len() == 1 && !args.merge {
        let (_, collection) = sources.into_iter().next().expect("one source");
        let output = export(&collection, format)?;
        for warning in &output.warnings {
            println!("  {} {}: {}", style("!").yellow(), warning.context, warning.message);
        }
        (output.bytes, output.filename)
    } else {
        let output = export_batch(sources, format, args.merge, &args.label)?;
        for failure in &output.failures {
            eprintln!("{} {}: {}", style("✗").red(), failure.source, failure.error);
        }
        for warning in &output.warnings {
            println!("  {} {}: {}", style("!").yellow(), warning.context, warning.message);
        }
        println!("{} {} source(s) encoded", style("✓").green(), output.succeeded);
        (output.bytes, output.filename)
    };

    let out_path = args.out_dir.join(&filename);
    tracing::debug!(path = %out_path.display(), bytes = bytes.len(), "writing output");
    fs::write(&out_path, bytes).with_context(|| format!("cannot write {}", out_path.display()))?;
    println!("{} wrote {}", style("✓").green(), out_path.display());
    Ok(())
}

fn inspect(args: InspectArgs) -> Result<()> {
    let bytes =
        fs::read(&args.input).with_context(|| format!("cannot read {}", args.input.display()))?;
    let name = args.input.file_name().and_then(|n| n.to_str());
    let format = detect(&bytes, name)?;
    println!("format: {}", format.name());

    let outcome = ingest(&bytes, name)?;
    report_outcome(&args.input, &outcome);
    if let Some(bbox) = outcome.collection.bbox {
        println!(
            "bbox: [{:.6}, {:.6}, {:.6}, {:.6}]",
            bbox[0], bbox[1], bbox[2], bbox[3]
        );
    }

    let mut type_counts: Vec<(&'static str, usize)> = Vec::new();
    for feature in &outcome.collection.features {
        let type_name = feature.geometry.type_name();
        match type_counts.iter_mut().find(|(t, _)| *t == type_name) {
            Some((_, count)) => *count += 1,
            None => type_counts.push((type_name, 1)),
        }
    }
    for (type_name, count) in type_counts {
        println!("  {count} × {type_name}");
    }

    if args.dump {
        let output = export(&outcome.collection, Format::GeoJson)?;
        println!("{}", String::from_utf8_lossy(&output.bytes));
    }
    Ok(())
}

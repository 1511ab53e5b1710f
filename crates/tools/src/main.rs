use std::path::PathBuf;

use clap::{Parser, Subcommand};
use foundation::math::Crs;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Measure, reproject and move drawn map features")]
struct Args {
    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print distance, area and perimeter for every feature of a GeoJSON, GPX or KML file
    Measure { file: PathBuf },

    /// Transform one coordinate between reference systems
    Reproject {
        /// Source CRS (wgs84, utm29n, utm31s, merchich)
        #[arg(long)]
        from: Crs,

        /// Target CRS
        #[arg(long)]
        to: Crs,

        #[arg(allow_negative_numbers = true)]
        x: f64,

        #[arg(allow_negative_numbers = true)]
        y: f64,
    },

    /// Add the features of a GeoJSON, GPX or KML file to a feature store
    Import {
        file: PathBuf,

        /// Store directory
        #[arg(long)]
        store: PathBuf,
    },

    /// Write a feature store as a GeoJSON FeatureCollection
    Export {
        /// Store directory
        #[arg(long)]
        store: PathBuf,

        /// Output file (default: stdout)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// List the features of a store with their measurements
    List {
        /// Store directory
        #[arg(long)]
        store: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = real_main(Args::parse()) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn real_main(args: Args) -> tools::Result<()> {
    match args.command {
        Command::Measure { file } => print_rows(&tools::measure(&file)?, args.json),
        Command::Reproject { from, to, x, y } => {
            let [px, py] = tools::reproject_point(from, to, x, y)?;
            if args.json {
                println!("[{px}, {py}]");
            } else if to.is_geographic() {
                println!("{px:.6} {py:.6}");
            } else {
                println!("{px:.3} {py:.3}");
            }
            Ok(())
        }
        Command::Import { file, store } => {
            let report = tools::import(&file, &store)?;
            if args.json {
                println!("{}", to_json(&report)?);
            } else {
                println!(
                    "added {}, rejected {}, skipped {}",
                    report.added, report.rejected, report.skipped
                );
            }
            Ok(())
        }
        Command::Export { store, out } => {
            let text = tools::export(&store)?;
            tools::write_output(out.as_deref(), &text)
        }
        Command::List { store } => print_rows(&tools::list(&store)?, args.json),
    }
}

fn print_rows(rows: &[tools::FeatureRow], json: bool) -> tools::Result<()> {
    if json {
        println!("{}", to_json(rows)?);
    } else {
        for row in rows {
            println!("{}", row.to_line());
        }
    }
    Ok(())
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> tools::Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| tools::ToolError::Io(e.to_string()))
}

use clap::{Parser, Subcommand};
use polars::prelude::*;
use std::path::PathBuf;
use vizdata::{DataConfig, LoadedData, NetworkType, OsmDataType, VizData, VizDataError};

#[derive(Parser)]
#[command(name = "vizdata")]
#[command(about = "Download and inspect the dashboard datasets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, help = "Data directory [default: $DATA_DIR or ./data]")]
    data_dir: Option<PathBuf>,

    #[arg(long, global = true, default_value_t = 10, help = "Rows to print")]
    rows: u32,

    #[arg(long, global = true, help = "Download the archive even if it is cached")]
    force_download: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// OpenFlights airport list
    Airports,

    /// GHCN daily station summaries
    Ghcn {
        #[arg(long, default_value = "ES", help = "Station file prefix, empty for all")]
        prefix: String,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// HISDAC settlement layers joined on NATCODE
    Hisdac {
        #[arg(long)]
        suffix: Option<String>,

        #[arg(long)]
        contains: Option<String>,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// OpenStreetMap buildings or roads, downloaded in chunks
    Osm {
        #[arg(long, default_value = "Spain")]
        place: String,

        #[arg(long, default_value = "roads", help = "buildings or roads")]
        data_type: String,

        #[arg(long, default_value = "all", help = "all, drive, walk or bike")]
        network: NetworkType,
    },

    /// World indicators joined on country, code and year
    World {
        #[arg(long)]
        suffix: Option<String>,
    },
}

fn print_data(data: &LoadedData, rows: u32) -> Result<(), VizDataError> {
    let schema = data.table.clone().collect_schema()?;
    println!("Schema:");
    for (name, dtype) in schema.iter() {
        println!("  {}: {}", name, dtype);
    }
    println!("{}", data.table.clone().limit(rows).collect()?);
    if let Some(reference) = &data.reference {
        println!("Reference ({} rows):", reference.height());
        println!("{}", reference.head(Some(rows as usize)));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), VizDataError> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = DataConfig::from_env();
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    let client = VizData::with_config(config).await?;
    let force_download = cli.force_download;

    let data = match cli.command {
        Commands::Airports => client.airports().force_download(force_download).call().await?,
        Commands::Ghcn { prefix, limit } => {
            client
                .ghcn()
                .prefix(prefix)
                .maybe_limit(limit)
                .force_download(force_download)
                .call()
                .await?
        }
        Commands::Hisdac {
            suffix,
            contains,
            limit,
        } => {
            client
                .hisdac()
                .maybe_suffix(suffix)
                .maybe_contains(contains)
                .maybe_limit(limit)
                .force_download(force_download)
                .call()
                .await?
        }
        Commands::Osm {
            place,
            data_type,
            network,
        } => {
            let data_type: OsmDataType = data_type.parse()?;
            client
                .osm()
                .place(place)
                .data_type(data_type)
                .network(network)
                .force_download(force_download)
                .call()
                .await?
        }
        Commands::World { suffix } => {
            client
                .world()
                .maybe_suffix(suffix)
                .force_download(force_download)
                .call()
                .await?
        }
    };

    print_data(&data, cli.rows)
}

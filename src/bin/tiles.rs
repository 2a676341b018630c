// Inspect CityGML tiles: count their roof edges or dump them as CSV.
//
// Handy for checking what a tile directory actually contains before
// pointing the mask service at it.

use std::path::PathBuf;

use clap::Parser;
use oaem::gml;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Tile files to inspect.
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// CityGML level of detail of the tiles.
    #[arg(long, default_value_t = 2)]
    lod: u8,

    /// Dump edges as `x1,y1,z1,x2,y2,z2` lines instead of a summary.
    #[arg(long)]
    csv: bool,
}

fn main() {
    pretty_env_logger::init();
    let args = Args::parse();

    if args.csv {
        println!("x1,y1,z1,x2,y2,z2");
    }

    let mut total = 0usize;
    for path in &args.paths {
        let rows = gml::parse_tile(path, args.lod);
        total += rows.len();
        if args.csv {
            for row in &rows {
                println!(
                    "{},{},{},{},{},{}",
                    row[0], row[1], row[2], row[3], row[4], row[5]
                );
            }
        } else {
            println!("{:8} edges  {}", rows.len(), path.display());
        }
    }

    if !args.csv {
        println!("{total:8} edges total");
    }
}

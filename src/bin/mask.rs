// Compute a mask for one position from the command line.
//
// Configuration comes from the OAEM_* environment variables; logging is
// controlled with RUST_LOG.

use chrono::{Local, Utc};
use clap::Parser;
use oaem::prelude::*;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// x (easting or longitude) in the request EPSG.
    #[arg(long)]
    x: f64,

    /// y (northing or latitude) in the request EPSG.
    #[arg(long)]
    y: f64,

    /// Ellipsoidal height in meters.
    #[arg(long)]
    z: f64,

    /// EPSG code of the position.
    #[arg(long, default_value_t = 25832)]
    epsg: u32,

    /// Also report current sun visibility with its change points.
    #[arg(long)]
    sun_visibility: bool,
}

fn main() {
    pretty_env_logger::init();
    let args = Args::parse();

    let config = Config::from_env().expect("configuration is valid");
    let service = OaemService::from_config(&config).expect("service starts");

    let result = service
        .compute_oaem(args.x, args.y, args.z, args.epsg)
        .expect("mask computation succeeds");

    if !result.within_area {
        println!("position is outside the area of operation");
    }
    println!("{}", result.oaem.az_el_str());

    if args.sun_visibility {
        let vis = service
            .sun_visibility(args.x, args.y, args.z, args.epsg, Utc::now())
            .expect("sun visibility computation succeeds");

        let fmt = |t: Option<chrono::DateTime<Utc>>| match t {
            Some(t) => t.with_timezone(&Local).to_rfc3339(),
            None => "None".to_string(),
        };
        println!("visible: {}", vis.visible);
        println!("since:   {}", fmt(vis.since));
        println!("until:   {}", fmt(vis.until));
    }
}

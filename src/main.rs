use std::path::Path;
use std::process::exit;

use clap::{App, Arg};
use itertools::Itertools;

use nyan::{Database, LATEST_T};

fn main() {
    let matches = App::new("nyan")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Load and inspect nyan data databases")
        .arg(
            Arg::with_name("INPUT")
                .help("Root .nyan file to load; imports are resolved relative to its directory")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("dump")
                .long("dump")
                .help("Print all objects with their effective member values"),
        )
        .arg(
            Arg::with_name("dot")
                .long("dot")
                .help("Export the inheritance graph in DOT format (needs the 'dot' feature)"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("More detailed logging (repeat for trace output)"),
        )
        .get_matches();

    let level = match matches.occurrences_of("verbose") {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    let _ = simple_logger::SimpleLogger::new().with_level(level).init();

    let input = matches.value_of("INPUT").unwrap_or_default();
    let path = Path::new(input);
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let root_file = match path.file_name().and_then(|name| name.to_str()) {
        Some(name) => name,
        None => {
            eprintln!("invalid input path: {}", input);
            exit(2);
        }
    };

    let database = match Database::from_dir(dir, root_file) {
        Ok(database) => database,
        Err(err) => {
            eprintln!("{}", err.render());
            exit(1);
        }
    };

    println!(
        "loaded {} objects from {}",
        database.info().objects().len(),
        input
    );

    if matches.is_present("dot") {
        #[cfg(feature = "dot")]
        {
            let mut out = std::io::stdout();
            if let Err(err) = nyan::dot::export_inheritance(&database, &mut out) {
                eprintln!("dot export failed: {}", err);
                exit(1);
            }
            return;
        }
        #[cfg(not(feature = "dot"))]
        {
            eprintln!("this binary was built without the 'dot' feature");
            exit(2);
        }
    }

    if matches.is_present("dump") {
        let view = database.new_view();
        for fqon in database.info().objects().keys().sorted() {
            let info = match database.info().object(fqon) {
                Some(info) => info,
                None => continue,
            };
            match info.patch() {
                Some(patch) => println!("{} <{}>:", fqon, patch.target()),
                None => println!("{}:", fqon),
            }

            let object = match view.get_object(fqon) {
                Ok(object) => object,
                Err(err) => {
                    eprintln!("  ! {}", err);
                    continue;
                }
            };

            for member in info.members().keys().sorted() {
                match object.get_value(member, LATEST_T) {
                    Ok(value) => println!("    {} = {}", member, value),
                    // patches may carry members that are never assigned
                    Err(_) => println!("    {} (no effective value)", member),
                }
            }
        }
    }
}

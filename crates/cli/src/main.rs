///! # mdict - dictionary shell
///!
///! Command-line front end for the dictionary engine. Installs dictionary
///! sources into a per-user data directory, then serves lookups,
///! completions and usage history from the compiled files.
///!
///! ## Commands
///!
///! ```text
///! mdict install <file>        Compile and install a dictionary source
///! mdict uninstall <name|n>    Remove an installed dictionary
///! mdict stats                 List installed dictionaries
///! mdict complete <prefix> [n] Word completions across all dictionaries
///! mdict history [n]           Most frequently looked-up words
///! mdict <word...>             Look a word up in every dictionary
///! ```
///!
///! ## Configuration
///!
///! ```text
///! MDICT_DATA   Data directory (default: ~/.local/share/mdict)
///! ```

mod app;
mod render;

use anyhow::{bail, Result};
use app::App;
use std::io::Write;

fn usage() {
    eprintln!("usage: mdict install <file>");
    eprintln!("       mdict uninstall <name|number>");
    eprintln!("       mdict stats");
    eprintln!("       mdict complete <prefix> [limit]");
    eprintln!("       mdict history [limit]");
    eprintln!("       mdict <word...>");
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        usage();
        std::process::exit(2);
    }

    let mut app = App::open(&App::data_dir())?;

    match args[0].as_str() {
        "install" => {
            let Some(source) = args.get(1) else {
                bail!("usage: mdict install <file>");
            };
            let name = app.install(source.as_ref(), |fraction| {
                print!("\rcompiling... {:5.1}%", fraction * 100.0);
                std::io::stdout().flush().ok();
            })?;
            println!("\rinstalled {}          ", name);
        }
        "uninstall" => {
            let Some(name) = args.get(1) else {
                bail!("usage: mdict uninstall <name|number>");
            };
            app.uninstall(name)?;
            println!("uninstalled {}", name);
        }
        "stats" => {
            if app.dictionaries().is_empty() {
                println!("no dictionaries installed");
            }
            for (n, dict) in app.dictionaries().iter().enumerate() {
                let (from, to) = dict.language();
                println!(
                    "{:2}. {} ({} -> {}): {} words, {} bytes",
                    n + 1,
                    dict.name(),
                    from,
                    to,
                    dict.size(),
                    dict.file_size()?
                );
            }
        }
        "complete" => {
            let Some(prefix) = args.get(1) else {
                bail!("usage: mdict complete <prefix> [limit]");
            };
            let limit = parse_limit(args.get(2), 10)?;
            for word in app.complete(prefix, limit) {
                println!("{}", word);
            }
        }
        "history" => {
            let limit = parse_limit(args.get(1), 20)?;
            for (word, count) in app.history().top(limit)? {
                println!("{:6}  {}", count, word);
            }
        }
        _ => {
            let word = args.join(" ");
            let hits = app.lookup(&word)?;
            if hits.is_empty() {
                println!("{}: not found", word);
            }
            for (dict_name, card) in hits {
                println!("== {} ==", dict_name);
                print!("{}", render::card(&card));
            }
        }
    }

    app.close()
}

fn parse_limit(arg: Option<&String>, default: usize) -> Result<usize> {
    match arg {
        Some(raw) => match raw.parse() {
            Ok(n) => Ok(n),
            Err(_) => bail!("limit must be a number, got '{}'", raw),
        },
        None => Ok(default),
    }
}

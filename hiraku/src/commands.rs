use crate::CLAP_STYLING;
use clap::{arg, command};
use url::Url;

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("hiraku")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("hiraku")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .subcommand_required(false)
        .subcommand(
            command!("analyze")
                .about(
                    "Analyze every route of a Next.js site: crawl pages, validate Open Graph \
                metadata and referenced images, and produce a report.",
                )
                .arg(
                    arg!(-r --"root" <DIR>)
                        .required(false)
                        .help("Application root (default: current directory, walking up to find one)")
                        .default_value("."),
                )
                .arg(
                    arg!(-p --"port" <PORT>)
                        .required(false)
                        .help("Preferred server port when locating or launching")
                        .value_parser(clap::value_parser!(u16)),
                )
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(false)
                        .help("Base URL of an already-running server (skips locate/launch)")
                        .value_parser(clap::value_parser!(Url)),
                )
                .arg(
                    arg!(-t --"concurrency" <NUM_WORKERS>)
                        .required(false)
                        .help("Number of concurrent in-flight route analyses")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("8"),
                )
                .arg(
                    arg!(--"timeout-ms" <MS>)
                        .required(false)
                        .help("Server readiness timeout in milliseconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("30000"),
                )
                .arg(
                    arg!(--"deadline-ms" <MS>)
                        .required(false)
                        .help("Overall run deadline; routes not started by then are skipped")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    arg!(--"param" <SPEC>)
                        .required(false)
                        .help("Sample value for a dynamic route, as 'PATTERN:KEY=VALUE' (repeatable)")
                        .action(clap::ArgAction::Append),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save report to file (default: display to screen)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json, markdown")
                        .value_parser(["text", "json", "markdown"])
                        .default_value("text"),
                )
                .arg(
                    arg!(--"db" <PATH>)
                        .required(false)
                        .help("Persist the run into a history database at this path"),
                ),
        )
        .subcommand(
            command!("routes")
                .about("List the routes discovered in a Next.js application root")
                .arg(
                    arg!(-r --"root" <DIR>)
                        .required(false)
                        .help("Application root")
                        .default_value("."),
                ),
        )
        .subcommand(
            command!("check")
                .about("Fetch a single URL and validate its Open Graph metadata")
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(true)
                        .help("The page URL to check")
                        .value_parser(clap::value_parser!(Url)),
                ),
        )
}

use ao3_api::{
    Ao3ApiError, ClientConfig, CommentTarget, Loadable, ResourceStore, Search, SearchQuery,
    Session, User, Work, get_comments,
};
use clap::{Parser, Subcommand};
use log::{error, info};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

/// Command-line client for Archive of Our Own
#[derive(Parser, Debug)]
#[command(name = "ao3", version, about)]
struct Cli {
    /// JSON client config file
    #[arg(long, env = "AO3_CONFIG")]
    config: Option<PathBuf>,

    /// Client-side limit as <requests>/<seconds>, e.g. 12/60
    #[arg(long, env = "AO3_RATE_LIMIT", value_parser = parse_rate_limit)]
    rate_limit: Option<RateLimitArg>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a work's metadata
    Work { id: u64 },
    /// Search works
    Search {
        text: String,
        #[arg(default_value_t = 1)]
        page: u32,
    },
    /// Print the first page of top-level comments on a work
    Comments { work_id: u64 },
    /// Print a user's profile
    User { username: String },
    /// Download every reference list into a directory
    Resources { dir: PathBuf },
}

#[derive(Clone, Copy, Debug)]
struct RateLimitArg {
    requests: usize,
    window_secs: u64,
}

fn parse_rate_limit(raw: &str) -> Result<RateLimitArg, String> {
    let (requests, window) = raw
        .split_once('/')
        .ok_or_else(|| format!("expected <requests>/<seconds>, got {raw}"))?;
    Ok(RateLimitArg {
        requests: requests.trim().parse().map_err(|e| format!("requests: {e}"))?,
        window_secs: window.trim().parse().map_err(|e| format!("seconds: {e}"))?,
    })
}

impl Cli {
    fn client_config(&self) -> Result<ClientConfig, Ao3ApiError> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::from_json_file(path)?,
            None => ClientConfig::default(),
        };
        if let Some(limit) = self.rate_limit {
            config = config.with_rate_limit(limit.requests, limit.window_secs);
        }
        Ok(config)
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Ao3ApiError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: Cli) -> Result<(), Ao3ApiError> {
    let session = Session::from_config(&cli.client_config()?)?;

    match cli.command {
        Command::Work { id } => {
            let work = Work::new(id, session);
            print_json(&*work.record()?)
        }
        Command::Search { text, page } => {
            let search = Search::new(SearchQuery::new().any_field(text.as_str()), session);
            print_json(&search.execute(page)?)
        }
        Command::Comments { work_id } => {
            let comments = get_comments(&session, CommentTarget::Work(work_id), 1, 1)?;
            let records = comments
                .iter()
                .map(|c| c.record().map(|r| (*r).clone()))
                .collect::<Result<Vec<_>, _>>()?;
            print_json(&records)
        }
        Command::User { username } => {
            let user = User::new(&username, session);
            print_json(&*user.record()?)
        }
        Command::Resources { dir } => {
            let store = ResourceStore::new(&dir);
            store.download_all_threaded(&session, false)?;
            info!("resources stored in {}", dir.display());
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    pretty_env_logger::init();
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

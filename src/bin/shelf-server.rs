//! this binary starts the catalog server
//! to see the list of options, type: `shelf-server --help`

use std::env::current_dir;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::exit;
use std::time::Duration;
use clap::{arg_enum, crate_version, value_t, App, Arg};
use shelf::thread_pool::{RayonThreadPool, SharedQueueThreadPool, ThreadPool};
use shelf::{
    AllocatorConfig, Backoff, Catalog, CatalogConfig, CatalogEngine, CatalogServer, KvStore,
    Result, ShelfError, SledCatalogEngine,
};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

arg_enum! {
    #[allow(non_camel_case_types)]
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    enum Engine {
        kvs,
        sled
    }
}

arg_enum! {
    #[allow(non_camel_case_types)]
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    enum Pool {
        shared,
        rayon
    }
}

const DEFAULT_ADDRESS: &str = "127.0.0.1:4000";
const DEFAULT_ENGINE: Engine = Engine::kvs;
const DEFAULT_POOL: Pool = Pool::shared;
// the name, file stem, of the "engine" file
const DEFAULT_ENGINE_FILE: &str = "engine";

/// ['Opt'] holds parsed and validated options from the command line
#[derive(Debug)]
struct Opt {
    addr: SocketAddr,
    engine: Engine,
    pool: Pool,
    threads: u32,
    data_dir: PathBuf,
    config: CatalogConfig,
}

impl Opt {
    /// validates the parsed command line `matches`
    /// # Errors
    /// returns [`ShelfError::Parsing`] if one of the parameters is invalid, or if the requested
    /// engine differs from the one the data directory was created with
    fn build(matches: &clap::ArgMatches) -> Result<Opt> {
        let addr = matches.value_of("addr").unwrap_or(DEFAULT_ADDRESS);
        let addr: SocketAddr = addr.parse().map_err(|_| {
            ShelfError::Parsing(format!("could not parse {} into an IP address and port", addr))
        })?;

        let data_dir = match matches.value_of("dir") {
            Some(dir) => PathBuf::from(dir),
            None => current_dir()?,
        };

        let req_engine = value_t!(matches, "engine", Engine).unwrap_or(DEFAULT_ENGINE);
        // the requested engine must be the same as the engine the data dir already uses
        let engine = match current_engine(&data_dir)? {
            None => req_engine,
            Some(cur_engine) if req_engine == cur_engine => cur_engine,
            Some(cur_engine) => {
                return Err(ShelfError::Parsing(format!(
                    "the requested engine: {} does not match the engine currently in use: {}",
                    req_engine, cur_engine
                )))
            }
        };

        let pool = value_t!(matches, "pool", Pool).unwrap_or(DEFAULT_POOL);
        let threads = parse_number(matches, "threads")?;
        if threads == 0 {
            return Err(ShelfError::Parsing("--threads must be at least 1".to_string()));
        }
        let max_attempts = parse_number(matches, "max-attempts")?;
        if max_attempts == 0 {
            return Err(ShelfError::Parsing("--max-attempts must be at least 1".to_string()));
        }
        let backoff_ms = parse_number(matches, "backoff-ms")?;

        let config = CatalogConfig {
            tag: matches.value_of("tag").unwrap_or(shelf::catalog::DEFAULT_TAG).to_string(),
            allocator: AllocatorConfig {
                max_attempts,
                backoff: Backoff::Fixed(Duration::from_millis(u64::from(backoff_ms))),
            },
            ..CatalogConfig::default()
        };

        Ok(Opt {
            addr,
            engine,
            pool,
            threads,
            data_dir,
            config,
        })
    }
}

fn parse_number(matches: &clap::ArgMatches, name: &str) -> Result<u32> {
    let raw = matches.value_of(name).unwrap_or_default();
    raw.parse()
        .map_err(|_| ShelfError::Parsing(format!("--{} expects a number, got {}", name, raw)))
}

fn main() {
    // set up a tracing subscriber to log to STDERR
    subscriber_config();

    let threads = num_threads().to_string();
    let matches = App::new("shelf-server")
        .version(crate_version!())
        .author("strohs <strohs1@gmail.com>")
        .about("serves a book catalog over TCP")
        .arg(Arg::with_name("addr")
            .long("addr")
            .value_name("IP_ADDR:PORT")
            .help("sets the IP_ADDR:PORT that the server listens on")
            .default_value(DEFAULT_ADDRESS))
        .arg(Arg::with_name("engine")
            .long("engine")
            .value_name("ENGINE_NAME")
            .help("sets the storage engine to use, either 'kvs' or 'sled'")
            .possible_values(&Engine::variants())
            .default_value("kvs"))
        .arg(Arg::with_name("dir")
            .long("dir")
            .value_name("PATH")
            .help("directory the catalog data is kept in, defaults to the current directory"))
        .arg(Arg::with_name("pool")
            .long("pool")
            .value_name("POOL")
            .help("thread pool that services connections, either 'shared' or 'rayon'")
            .possible_values(&Pool::variants())
            .default_value("shared"))
        .arg(Arg::with_name("threads")
            .long("threads")
            .value_name("N")
            .help("number of threads in the pool")
            .default_value(&threads))
        .arg(Arg::with_name("tag")
            .long("tag")
            .value_name("TAG")
            .help("tag at the front of book identifiers, as in TAG-2025-000001")
            .default_value(shelf::catalog::DEFAULT_TAG))
        .arg(Arg::with_name("max-attempts")
            .long("max-attempts")
            .value_name("N")
            .help("identifier candidates tried before an allocation fails")
            .default_value("10"))
        .arg(Arg::with_name("backoff-ms")
            .long("backoff-ms")
            .value_name("MILLIS")
            .help("pause between two allocation attempts")
            .default_value("10"))
        .get_matches();

    let opt = match Opt::build(&matches) {
        Ok(opt) => opt,
        Err(err) => {
            eprintln!("{}", err);
            exit(1);
        }
    };

    if let Err(e) = run(opt) {
        eprintln!("{}", e);
        exit(1);
    }
}

fn run(opt: Opt) -> Result<()> {
    info!("shelf-server {}", env!("CARGO_PKG_VERSION"));
    info!("Storage engine: {}", opt.engine);
    info!("Thread pool: {} with {} threads", opt.pool, opt.threads);
    info!("Listening on {}", opt.addr);

    fs::create_dir_all(&opt.data_dir)?;
    fs::write(opt.data_dir.join(DEFAULT_ENGINE_FILE), format!("{}", opt.engine))?;

    match opt.engine {
        Engine::kvs => run_with_engine(KvStore::open(&opt.data_dir)?, opt),
        Engine::sled => {
            let db = sled::open(opt.data_dir.join("sled"))?;
            run_with_engine(SledCatalogEngine::new(db), opt)
        }
    }
}

fn run_with_engine<E: CatalogEngine>(engine: E, opt: Opt) -> Result<()> {
    let catalog = Catalog::with_config(engine, opt.config);
    match opt.pool {
        Pool::shared => {
            CatalogServer::new(catalog, SharedQueueThreadPool::new(opt.threads)?).run(opt.addr)
        }
        Pool::rayon => CatalogServer::new(catalog, RayonThreadPool::new(opt.threads)?).run(opt.addr),
    }
}

/// determines if there is an "engine" file in `dir` and returns the value of that file, else None
///
/// An engine file with invalid contents is logged and treated as absent.
fn current_engine(dir: &Path) -> Result<Option<Engine>> {
    let engine = dir.join(DEFAULT_ENGINE_FILE);
    if !engine.exists() {
        return Ok(None);
    }

    match fs::read_to_string(engine)?.trim().parse() {
        Ok(engine) => Ok(Some(engine)),
        Err(e) => {
            warn!("The content of the engine file is invalid: {}", e);
            Ok(None)
        }
    }
}

fn num_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// configures a tracing subscriber that will log to STDERR
fn subscriber_config() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        // log to stderr instead of stdout
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting tracing default subscriber failed");
}

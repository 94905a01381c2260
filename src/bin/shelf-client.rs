//! The shelf-client executable supports the following command line arguments:
//!
//! `shelf-client add <TITLE> [--author NAME]... [--isbn ISBN] [--publisher NAME]
//!     [--category NAME] [--year YEAR] [--copies N] [--addr IP-PORT]`
//!
//!     Add a book to the catalog and print its allocated identifier.
//!
//! `shelf-client get <ID> [--addr IP-PORT]`
//!
//!     Print the book with the given identifier as JSON, or "Book not found".
//!
//! `shelf-client rm <ID> [--addr IP-PORT]`
//!
//!     Remove a book. A missing book is treated as an error.
//!
//! `shelf-client ls [PREFIX] [--addr IP-PORT]`
//!
//!     Print the identifier and title of every book whose identifier starts with PREFIX.
//!
//! `shelf-client next <PREFIX> [--addr IP-PORT]`
//!
//!     Print the identifier the server would allocate next under PREFIX.
//!
//! --addr accepts an IP address, either v4 or v6, and a port number, with the format IP:PORT.
//! If --addr is not specified then connect on 127.0.0.1:4000. An error is printed and a
//! non-zero exit code returned on server error, or if IP-PORT does not parse as an address.

use std::net::SocketAddr;
use std::process::exit;
use clap::{crate_version, App, Arg, ArgMatches, SubCommand};
use shelf::{CatalogClient, NewBook, Result, ShelfError};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

const DEFAULT_ADDRESS: &str = "127.0.0.1:4000";

/// the client side operations, as parsed from the command line
#[derive(Debug)]
enum Op {
    Add(NewBook),
    Get(String),
    Remove(String),
    List(String),
    Next(String),
}

/// ['Opt'] holds parsed and validated options from the command line
#[derive(Debug)]
struct Opt {
    /// the server's ip:port
    addr: SocketAddr,
    op: Op,
}

impl Opt {
    /// validates the `addr` parameter is a valid IP address and PORT
    /// # Errors
    /// returns [`ShelfError::Parsing`] if one of the parameters is invalid
    fn build(addr: &str, op: Op) -> Result<Opt> {
        let addr: SocketAddr = addr.parse().map_err(|_| {
            ShelfError::Parsing(format!("could not parse {} into an IP address and port", addr))
        })?;

        Ok(Opt { addr, op })
    }
}

fn main() {
    // configure a subscriber that will log messages to STDERR
    subscriber_config();

    let matches = App::new("shelf-client")
        .version(crate_version!())
        .author("strohs <strohs1@gmail.com>")
        .about("a client for the shelf book catalog")
        .subcommands(vec![
            SubCommand::with_name("add")
                .about("Add a book and print its identifier")
                .arg(Arg::with_name("TITLE").required(true).index(1))
                .arg(Arg::with_name("author").long("author").takes_value(true).multiple(true).number_of_values(1))
                .arg(Arg::with_name("isbn").long("isbn").takes_value(true))
                .arg(Arg::with_name("publisher").long("publisher").takes_value(true))
                .arg(Arg::with_name("category").long("category").takes_value(true))
                .arg(Arg::with_name("year").long("year").takes_value(true))
                .arg(Arg::with_name("copies").long("copies").takes_value(true).default_value("1"))
                .arg(addr_arg()),
            SubCommand::with_name("get")
                .about("Print a book by identifier")
                .arg(Arg::with_name("ID").required(true).index(1))
                .arg(addr_arg()),
            SubCommand::with_name("rm")
                .about("Remove a book by identifier")
                .arg(Arg::with_name("ID").required(true).index(1))
                .arg(addr_arg()),
            SubCommand::with_name("ls")
                .about("List books whose identifier starts with a prefix")
                .arg(Arg::with_name("PREFIX").index(1))
                .arg(addr_arg()),
            SubCommand::with_name("next")
                .about("Print the next identifier the server would allocate under a prefix")
                .arg(Arg::with_name("PREFIX").required(true).index(1))
                .arg(addr_arg()),
        ])
        .get_matches();

    let result = parse_options(&matches).and_then(run);
    if let Err(e) = result {
        eprintln!("{}", e);
        exit(1);
    }
}

/// the `--addr` option shared by every subcommand
fn addr_arg<'a, 'b>() -> Arg<'a, 'b> {
    Arg::with_name("addr")
        .long("addr")
        .value_name("IP_ADDR:PORT")
        .help("sets the IP_ADDR:PORT of the server to connect to")
        .default_value(DEFAULT_ADDRESS)
}

/// runs the parsed operation against the server at `opt.addr`
fn run(opt: Opt) -> Result<()> {
    let mut client = CatalogClient::connect(opt.addr)?;
    match opt.op {
        Op::Add(book) => {
            let book = client.create(book)?;
            println!("{}", book.id);
        }
        Op::Get(id) => match client.get(id)? {
            Some(book) => println!("{}", serde_json::to_string_pretty(&book)?),
            None => println!("Book not found"),
        },
        Op::Remove(id) => client.remove(id)?,
        Op::List(prefix) => {
            for book in client.list(prefix)? {
                println!("{}\t{}", book.id, book.title);
            }
        }
        Op::Next(prefix) => println!("{}", client.next_id(prefix)?),
    }
    Ok(())
}

/// parses the matches from the command line into an [`Opt`] struct
fn parse_options(matches: &ArgMatches) -> Result<Opt> {
    let (name, args) = match matches.subcommand() {
        (name, Some(args)) => (name, args),
        _ => return Err(ShelfError::Parsing("a subcommand is required, see --help".to_string())),
    };
    let addr = args.value_of("addr").unwrap_or(DEFAULT_ADDRESS);
    let op = match name {
        "add" => Op::Add(parse_book(args)?),
        "get" => Op::Get(required(args, "ID")?),
        "rm" => Op::Remove(required(args, "ID")?),
        "ls" => Op::List(args.value_of("PREFIX").unwrap_or_default().to_string()),
        "next" => Op::Next(required(args, "PREFIX")?),
        other => return Err(ShelfError::Parsing(format!("unknown command {}", other))),
    };
    Opt::build(addr, op)
}

fn parse_book(args: &ArgMatches) -> Result<NewBook> {
    let mut book = NewBook::titled(required(args, "TITLE")?);
    book.authors = args
        .values_of("author")
        .map(|authors| authors.map(String::from).collect())
        .unwrap_or_default();
    book.isbn = args.value_of("isbn").map(String::from);
    book.publisher = args.value_of("publisher").map(String::from);
    book.category = args.value_of("category").map(String::from);
    book.published_year = args
        .value_of("year")
        .map(|year| {
            year.parse()
                .map_err(|_| ShelfError::Parsing(format!("--year expects a year, got {}", year)))
        })
        .transpose()?;
    let copies = args.value_of("copies").unwrap_or("1");
    book.total_copies = copies
        .parse()
        .map_err(|_| ShelfError::Parsing(format!("--copies expects a number, got {}", copies)))?;
    Ok(book)
}

fn required(args: &ArgMatches, name: &str) -> Result<String> {
    args.value_of(name)
        .map(String::from)
        .ok_or_else(|| ShelfError::Parsing(format!("missing argument {}", name)))
}

/// configures a tracing subscriber that will log to STDERR
fn subscriber_config() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::WARN)
        // log to stderr instead of stdout
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting tracing default subscriber failed");
}

use crate::catalog::Catalog;
use crate::command::{Request, Response};
use crate::thread_pool::ThreadPool;
use crate::{CatalogEngine, Result, ShelfError};
use serde_json::Deserializer;
use std::io::{BufReader, BufWriter, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, error, info};

/// A TCP socket server over a book [`Catalog`].
/// It listens for incoming [`Request`]s on a [`SocketAddr`](https://doc.rust-lang.org/std/net/enum.SocketAddr.html)
/// and services every connection on a thread from its [`ThreadPool`].
///
/// Each thread receives a clone of the catalog; clones share the same storage engine.
///
/// # Example
/// Create a server listening on "127.0.0.1:4000", with 4 threads running on a Rayon
/// Thread Pool, using the KvStore storage engine
/// ```rust
/// use std::net::SocketAddr;
/// use std::path::Path;
/// use shelf::{Catalog, CatalogServer, KvStore};
/// use shelf::thread_pool::{RayonThreadPool, ThreadPool};
/// # use std::error::Error;
/// # fn main() -> Result<(), Box<dyn Error>> {
/// let addr: SocketAddr = "127.0.0.1:4000".parse()?;
/// let pool = RayonThreadPool::new(4)?;
/// let catalog = Catalog::new(KvStore::open(Path::new("."))?);
/// let server = CatalogServer::new(catalog, pool);
/// //server.run(addr)?;
/// #
/// # Ok(())
/// # }
/// ```
///
/// [`Request`]: ./enum.Request.html
pub struct CatalogServer<E: CatalogEngine, P: ThreadPool> {
    catalog: Catalog<E>,
    pool: P,
}

impl<E: CatalogEngine, P: ThreadPool> CatalogServer<E, P> {
    /// Create a new `CatalogServer` over `catalog`, servicing connections on `pool`.
    pub fn new(catalog: Catalog<E>, pool: P) -> Self {
        CatalogServer { catalog, pool }
    }

    /// starts a server listening on the given address.
    ///
    /// # Errors
    /// returns [`ShelfError::Io`] if the address could not be bound
    pub fn run<A: ToSocketAddrs>(self, addr: A) -> Result<()> {
        let listener = TcpListener::bind(addr)?;
        self.serve(listener)
    }

    /// accepts connections from an already bound `listener` until it fails
    pub fn serve(self, listener: TcpListener) -> Result<()> {
        info!("accepting connections on {}", listener.local_addr()?);
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let catalog = self.catalog.clone();
                    self.pool.spawn(move || {
                        if let Err(e) = serve(catalog, stream) {
                            error!("Error on serving client: {}", e);
                        }
                    });
                }
                Err(e) => error!("Connection failed: {}", e),
            }
        }
        Ok(())
    }
}

/// Processes catalog [`Request`]s coming over the given `tcp` stream until the client hangs
/// up, sending one [`Response`] back per request.
///
/// [`Request`]: ./enum.Request.html
/// [`Response`]: ./enum.Response.html
fn serve<E: CatalogEngine>(catalog: Catalog<E>, tcp: TcpStream) -> Result<()> {
    let peer_addr = tcp.peer_addr()?;
    let stream_reader = BufReader::new(&tcp);
    let mut stream_writer = BufWriter::new(&tcp);
    let req_reader = Deserializer::from_reader(stream_reader).into_iter::<Request>();

    let mut send_resp = move |resp: Response| -> Result<()> {
        serde_json::to_writer(&mut stream_writer, &resp)?;
        stream_writer.flush()?;
        debug!("Response sent to {}: {:?}", peer_addr, resp);
        Ok(())
    };

    for req in req_reader {
        let req = req?;
        debug!("Receive request from {}: {:?}", peer_addr, req);
        send_resp(handle(&catalog, req))?;
    }
    Ok(())
}

/// runs a single request against the catalog
fn handle<E: CatalogEngine>(catalog: &Catalog<E>, req: Request) -> Response {
    let result = match req {
        Request::Create { book } => catalog.create_book(book).map(Response::Book),
        Request::Get { id } => catalog
            .get_book(&id)
            .map(|book| book.map_or(Response::NotFound, Response::Book)),
        Request::Update { book } => catalog.update_book(&book).map(|_| Response::Ok),
        Request::Remove { id } => match catalog.remove_book(&id) {
            Err(ShelfError::KeyNotFound) => Ok(Response::NotFound),
            other => other.map(|_| Response::Ok),
        },
        Request::List { prefix } => catalog.list_books(&prefix).map(Response::Books),
        Request::Allocate { prefix } => catalog.peek_next_id_for(&prefix).map(Response::Id),
    };
    result.unwrap_or_else(Response::from)
}

use std::io::{BufReader, BufWriter, Write};
use std::net::{TcpStream, ToSocketAddrs};
use serde::Deserialize;
use serde_json::de::IoRead;
use serde_json::Deserializer;
use crate::catalog::{Book, NewBook};
use crate::command::{Request, Response};
use crate::{Result, ShelfError};

/// `CatalogClient` contains the functionality for communication with a [`CatalogServer`]
///
/// [`CatalogServer`]: ./struct.CatalogServer.html
pub struct CatalogClient {
    reader: Deserializer<IoRead<BufReader<TcpStream>>>,
    writer: BufWriter<TcpStream>,
}

impl CatalogClient {
    /// creates a client and establishes a socket connection to the server at the given `addr`
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let tcp_reader = TcpStream::connect(addr)?;
        let tcp_writer = tcp_reader.try_clone()?;

        Ok(CatalogClient {
            reader: Deserializer::from_reader(BufReader::new(tcp_reader)),
            writer: BufWriter::new(tcp_writer),
        })
    }

    /// adds `book` to the catalog and returns it with its allocated identifier
    /// # Errors
    /// `ShelfError::Remote` with kind `Unavailable` if the server could not find a free
    /// identifier
    pub fn create(&mut self, book: NewBook) -> Result<Book> {
        match self.call(Request::Create { book })? {
            Response::Book(book) => Ok(book),
            other => Err(unexpected(other)),
        }
    }

    /// gets the book with identifier `id` from the server
    /// ## Returns
    /// `Ok<Some<Book>>` if the book was found, `Ok<None>` if there is no such book
    pub fn get(&mut self, id: String) -> Result<Option<Book>> {
        match self.call(Request::Get { id })? {
            Response::Book(book) => Ok(Some(book)),
            Response::NotFound => Ok(None),
            other => Err(unexpected(other)),
        }
    }

    /// replaces the record of an existing book
    pub fn update(&mut self, book: Book) -> Result<()> {
        match self.call(Request::Update { book })? {
            Response::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// removes a book from the catalog
    /// # Errors
    /// `ShelfError::KeyNotFound` if there is no book with identifier `id`
    pub fn remove(&mut self, id: String) -> Result<()> {
        match self.call(Request::Remove { id })? {
            Response::Ok => Ok(()),
            Response::NotFound => Err(ShelfError::KeyNotFound),
            other => Err(unexpected(other)),
        }
    }

    /// lists the books whose identifier starts with `prefix`
    pub fn list(&mut self, prefix: String) -> Result<Vec<Book>> {
        match self.call(Request::List { prefix })? {
            Response::Books(books) => Ok(books),
            other => Err(unexpected(other)),
        }
    }

    /// returns the identifier the server would allocate next under `prefix`
    pub fn next_id(&mut self, prefix: String) -> Result<String> {
        match self.call(Request::Allocate { prefix })? {
            Response::Id(id) => Ok(id),
            other => Err(unexpected(other)),
        }
    }

    /// sends `req` and waits for its response, turning error responses into [`ShelfError::Remote`]
    fn call(&mut self, req: Request) -> Result<Response> {
        serde_json::to_writer(&mut self.writer, &req)?;
        self.writer.flush()?;

        match Response::deserialize(&mut self.reader)? {
            Response::Err { kind, message } => Err(ShelfError::Remote { kind, message }),
            resp => Ok(resp),
        }
    }
}

fn unexpected(resp: Response) -> ShelfError {
    ShelfError::Command(format!("unexpected response from server: {:?}", resp))
}

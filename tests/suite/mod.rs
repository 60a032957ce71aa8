mod config;
mod librarian;
mod pipeline;

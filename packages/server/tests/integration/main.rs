mod common;
mod pipeline;
mod schema;

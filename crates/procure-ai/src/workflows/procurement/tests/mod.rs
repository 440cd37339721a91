mod common;
mod feedback;
mod pipeline;
mod service;

pub mod gemini;
pub mod leads;
pub mod models;
pub mod pdf;
pub mod routes;
pub mod session;

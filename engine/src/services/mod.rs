pub mod certificate_id;
pub mod fonts;
pub mod ingest;
pub mod render;
pub mod storage;

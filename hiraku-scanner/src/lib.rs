pub mod error;
pub mod images;
pub mod metadata;
pub mod routes;
pub mod server;

pub use error::AnalyzeError;
pub use images::{ImageCache, ImageInfo, fetch_image_info};
pub use metadata::{OgMetadata, build_http_client, fetch_and_parse_og_metadata, parse_og_metadata};
pub use routes::{NextRoutes, RouteDescriptor, RouteSource, discover_routes};
pub use server::{
    ServerHandle, find_next_dir, find_running_server, start_server, validate_next_dir,
    wait_for_server,
};

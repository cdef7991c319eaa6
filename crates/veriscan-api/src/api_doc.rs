//! OpenAPI documentation, served at `/api/v0/openapi.json`.

use utoipa::OpenApi;

use crate::error;
use crate::handlers;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Veriscan API",
        version = "0.1.0",
        description = "File upload malware-scanning pipeline. Uploads are accepted \
            asynchronously and scanned out of band; clients poll the status endpoint \
            until the file reaches a terminal status (CLEAN, INFECTED, or FAILED)."
    ),
    paths(
        handlers::upload::upload_file,
        handlers::status::get_file_status,
        handlers::health::health,
    ),
    components(schemas(
        handlers::upload::UploadResponse,
        handlers::status::StatusResponse,
        error::ErrorResponse,
        veriscan_core::ScanStatus,
    )),
    tags(
        (name = "files", description = "Upload intake and scan status"),
        (name = "health", description = "Liveness probe")
    )
)]
pub struct ApiDoc;

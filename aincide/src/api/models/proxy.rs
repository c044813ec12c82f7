use serde::Deserialize;
use utoipa::IntoParams;

/// Query parameters for `GET /api/proxy/auth-files/download`
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct DownloadQuery {
    /// Auth file name as listed by the management API
    pub name: Option<String>,
}

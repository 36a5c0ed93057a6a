//! Controllers mounted under the API prefix.

pub mod status;
pub mod user;

use crate::http::Routes;

/// Every controller's routes.
pub fn routes(routes: Routes) -> Routes {
    user::routes(status::routes(routes))
}

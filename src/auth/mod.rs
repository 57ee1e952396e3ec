//! Authentication state carried by requests.
//!
//! Token cookies and bearer headers are resolved into a [`Principal`] once per
//! request. Protected gateway routes go through the [`AuthenticationGate`];
//! application handlers behind the gateway read the principal with the
//! [`Authenticated`] and [`MaybeAuthenticated`] extractors.

mod cookie;
mod errors;
mod extractors;
mod gate;
mod ip;
mod resolve;
mod types;

pub use cookie::{RequestCookies, encode_deletion_cookie, encode_token_cookie};
pub(crate) use errors::error_response;
pub use errors::Unauthorized;
pub use extractors::{Authenticated, MaybeAuthenticated};
pub use gate::{AuthenticationGate, is_authorized, login_redirect_location};
pub use ip::{ClientIpSource, extract_client_ip};
pub use resolve::{bearer_token, resolve_principal};
pub use types::{AuthScheme, Principal, RequiredScheme};

//! # Routes
//!
//! | Prefix                  | Module              |
//! |-------------------------|---------------------|
//! | `/v1/visits/*`          | [`visits`]          |
//! | `/v1/credentials/*`     | [`credentials`]     |
//! | `/v1/presence`          | [`presence`]        |
//! | `/v1/correspondence/*`  | [`correspondence`]  |
//! | `/v1/dashboard/*`, `/metrics` | [`dashboard`] |

pub mod correspondence;
pub mod credentials;
pub mod dashboard;
pub mod presence;
pub mod visits;

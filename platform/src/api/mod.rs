//! HTTP handlers.
//!
//! Handlers only translate between HTTP and the services: extract the
//! caller and the payload, call one service method, wrap the result in the
//! response envelope. Every error converts into the envelope through
//! [`AppError`](arena_web::AppError).
//!
//! - [`cart`]: `GET /cart`, `POST /cart/add`, `DELETE /cart/remove`
//! - [`checkout`]: `POST /checkout`
//! - [`payments`]: gateway callback, admin verification, registration
//!   listings
//! - [`flags`]: flag creation, listing and review

pub mod cart;
pub mod checkout;
pub mod flags;
pub mod payments;

//! CollectDesk web server and UI.
//!
//! This crate provides the Leptos-based dashboard for the CollectDesk
//! debt-collection platform and the JSON API that gates access to it.

#![allow(non_snake_case)]

pub mod app;

#[cfg(feature = "ssr")]
pub mod auth;
#[cfg(feature = "ssr")]
pub mod config;
#[cfg(feature = "ssr")]
pub mod error;

#[cfg(feature = "hydrate")]
#[wasm_bindgen::prelude::wasm_bindgen]
pub fn hydrate() {
    use crate::app::App;
    console_error_panic_hook::set_once();
    leptos::mount::hydrate_body(App);
}

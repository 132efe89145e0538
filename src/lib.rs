//! Streaming chat client for an accessible-travel assistant.
//!
//! - [`chat`]: stream client, display pacing, conversations and send gate
//! - [`server`]: development backend speaking the same event stream
//! - [`cli`]: terminal front end

// Interdiction stricte de pratiques dangereuses ou non idiomatiques
#![deny(unsafe_code)] // Le code unsafe est interdit
#![warn(missing_docs)] // Toute fonction, struct, enum ou module public doit être documenté
#![deny(non_camel_case_types)]
#![deny(unused_must_use)] // Oblige à gérer explicitement les Result et Option
#![deny(nonstandard_style)] // Empêche tout style de code non standard
#![forbid(unsafe_op_in_unsafe_fn)]

// Clippy pour stricte discipline
#![deny(clippy::unwrap_used)] // Interdit unwrap()
#![deny(clippy::expect_used)] // Interdit expect()
#![deny(clippy::panic)] // Interdit panic!()
#![deny(clippy::print_stdout)] // Interdit println!() en production
#![deny(clippy::todo)] // Interdit les TODO dans le code
#![deny(clippy::unimplemented)] // Interdit les fonctions non implémentées
#![deny(clippy::module_inception)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

/// Chat client core.
pub mod chat;
/// Terminal front end.
pub mod cli;
/// Development HTTP backend.
#[allow(clippy::missing_errors_doc)]
pub mod server;
/// Entry helpers for the binaries.
pub mod start_travel_chat;

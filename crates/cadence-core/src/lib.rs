//! Cadence Core - Playlist and transport engine
//!
//! This crate provides the playlist, the transport state machine that
//! reacts to user commands and end-of-track events, the audio backend
//! capability with a native implementation, directory scanning and the
//! command-line parser.

pub mod backend;
pub mod command;
pub mod decoder;
pub mod device;
pub mod library;
pub mod output;
pub mod playlist;
pub mod transport;

pub use backend::{ AudioBackend, BackendError, PlaybackState };
pub use command::{ Command, CommandError };
pub use device::DeviceBackend;
pub use library::LibraryError;
pub use playlist::{ Playlist, Track };
pub use transport::{ LoopMode, Status, TransportController, TransportError, TransportOptions };

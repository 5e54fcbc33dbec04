//! Audio backend capability
//!
//! The transport drives playback exclusively through [`AudioBackend`], so
//! different native audio stacks can be swapped in without touching it.

use std::path::{ Path, PathBuf };
use std::time::Duration;

use thiserror::Error;


/// Lowest and highest volume accepted by backends.
pub const MIN_VOLUME: f32 = 0.0;
pub const MAX_VOLUME: f32 = 100.0;


/// Errors reported by an audio backend.
#[derive( Debug, Error )]
pub enum BackendError {
    #[error( "Failed to open {path}: {reason}" )]
    Load { path: PathBuf, reason: String },

    #[error( "Audio output error: {0}" )]
    Output( String ),

    #[error( "Seek error: {0}" )]
    Seek( String ),

    #[error( "No track loaded" )]
    NoTrack,
}


/// Current playback state as reported by the backend.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}


impl std::fmt::Display for PlaybackState {
    fn fmt( &self, f: &mut std::fmt::Formatter<'_> ) -> std::fmt::Result {
        let name = match self {
            PlaybackState::Stopped => "Stopped",
            PlaybackState::Playing => "Playing",
            PlaybackState::Paused => "Paused",
        };
        f.write_str( name )
    }
}


/// Called by the backend when a track finishes on its own.
pub type EndCallback = Box<dyn FnMut() + Send>;


/// Playback capability consumed by the transport.
///
/// Natural end of a track must only be reported from [`AudioBackend::poll`],
/// never pushed from another thread.
pub trait AudioBackend {
    /// Loads a file, replacing whatever was loaded. Leaves the backend stopped.
    fn load( &mut self, path: &Path ) -> Result<(), BackendError>;

    /// Starts or resumes playback of the loaded file.
    fn play( &mut self ) -> Result<(), BackendError>;

    fn pause( &mut self );

    fn stop( &mut self );

    /// Moves the playhead of the loaded file.
    fn seek( &mut self, position: Duration ) -> Result<(), BackendError>;

    fn position( &self ) -> Duration;

    /// Duration of the loaded file, zero if unknown.
    fn duration( &self ) -> Duration;

    /// Sets the volume, clamped to `[MIN_VOLUME, MAX_VOLUME]`.
    fn set_volume( &mut self, volume: f32 );

    fn volume( &self ) -> f32;

    fn state( &self ) -> PlaybackState;

    fn is_playing( &self ) -> bool {
        self.state() == PlaybackState::Playing
    }

    /// Path of the loaded file, if any.
    fn current_file( &self ) -> Option<&Path>;

    /// Registers the callback fired from `poll` after a natural end.
    fn set_on_end( &mut self, callback: EndCallback );

    /// Checks for end-of-track. Must be called regularly by the host loop.
    fn poll( &mut self );
}


/// Clamps a requested volume into the accepted range.
pub fn clamp_volume( volume: f32 ) -> f32 {
    if volume.is_nan() {
        return MIN_VOLUME;
    }
    volume.clamp( MIN_VOLUME, MAX_VOLUME )
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_clamp_volume() {
        assert_eq!( clamp_volume( -5.0 ), 0.0 );
        assert_eq!( clamp_volume( 42.5 ), 42.5 );
        assert_eq!( clamp_volume( 250.0 ), 100.0 );
        assert_eq!( clamp_volume( f32::NAN ), 0.0 );
    }


    #[test]
    fn test_state_display() {
        assert_eq!( PlaybackState::Paused.to_string(), "Paused" );
        assert_eq!( PlaybackState::default(), PlaybackState::Stopped );
    }
}

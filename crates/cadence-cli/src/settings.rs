//! Application settings management
//!
//! Reads tunables (volume, seek step, poll interval, log level) from a JSON file.

use std::fs;
use std::path::{ Path, PathBuf };
use std::time::Duration;

use anyhow::{ Context, Result };
use cadence_core::TransportOptions;
use serde::Deserialize;


/// Application settings.
#[derive( Debug, Clone, PartialEq, Deserialize )]
#[serde( default )]
pub struct Settings {
    /// Volume at startup (0-100)
    pub volume: f32,

    /// Fast forward / rewind distance in seconds
    pub seek_step_secs: f64,

    /// Volume change for vol+ / vol-
    pub volume_step: f32,

    /// "prev" restarts the current track once it has played this long
    pub restart_threshold_secs: f64,

    /// How often the backend is polled for end of track
    pub poll_interval_ms: u64,

    /// Default log filter when CADENCE_LOG is unset
    pub log_level: String,
}


impl Default for Settings {
    fn default() -> Self {
        Self {
            volume: 50.0,
            seek_step_secs: 10.0,
            volume_step: 5.0,
            restart_threshold_secs: 3.0,
            poll_interval_ms: 100,
            log_level: "info".to_string(),
        }
    }
}


impl Settings {
    /// Returns the path to the default settings file.
    pub fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map( |p| p.join( "cadence" ).join( "settings.json" ) )
    }


    /// Loads settings from `path`, or the default location when None.
    ///
    /// A missing file yields defaults; an unreadable or malformed one is an error.
    pub fn load( path: Option<&Path> ) -> Result<Self> {
        let path = match path.map( Path::to_path_buf ).or_else( Self::settings_path ) {
            Some( p ) => p,
            None => return Ok( Self::default() ),
        };

        if !path.exists() {
            return Ok( Self::default() );
        }

        let contents = fs::read_to_string( &path )
            .with_context( || format!( "Failed to read settings {}", path.display() ) )?;
        serde_json::from_str( &contents )
            .with_context( || format!( "Failed to parse settings {}", path.display() ) )
    }


    /// Transport tunables derived from these settings.
    pub fn transport_options( &self ) -> TransportOptions {
        let defaults = TransportOptions::default();
        TransportOptions {
            seek_step: Duration::try_from_secs_f64( self.seek_step_secs ).unwrap_or( defaults.seek_step ),
            volume_step: self.volume_step,
            restart_threshold: Duration::try_from_secs_f64( self.restart_threshold_secs )
                .unwrap_or( defaults.restart_threshold ),
        }
    }


    pub fn poll_interval( &self ) -> Duration {
        Duration::from_millis( self.poll_interval_ms.max( 10 ) )
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load( Some( &dir.path().join( "none.json" ) ) ).unwrap();
        assert_eq!( settings, Settings::default() );
    }


    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "settings.json" );
        fs::write( &path, r#"{ "volume": 80, "seek_step_secs": 5 }"# ).unwrap();

        let settings = Settings::load( Some( &path ) ).unwrap();

        assert_eq!( settings.volume, 80.0 );
        assert_eq!( settings.transport_options().seek_step, Duration::from_secs( 5 ) );
        assert_eq!( settings.poll_interval_ms, 100 );
        assert_eq!( settings.log_level, "info" );
    }


    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "settings.json" );
        fs::write( &path, "{ volume: " ).unwrap();

        assert!( Settings::load( Some( &path ) ).is_err() );
    }


    #[test]
    fn test_negative_durations_fall_back() {
        let settings = Settings {
            seek_step_secs: -1.0,
            restart_threshold_secs: f64::NAN,
            poll_interval_ms: 0,
            ..Settings::default()
        };
        let options = settings.transport_options();

        assert_eq!( options.seek_step, Duration::from_secs( 10 ) );
        assert_eq!( options.restart_threshold, Duration::from_secs( 3 ) );
        assert_eq!( settings.poll_interval(), Duration::from_millis( 10 ) );
    }
}

//! Command-line argument parsing for Cadence.

use std::path::PathBuf;

use cadence_core::LoopMode;
use clap::Parser;


/// Cadence - A line-oriented terminal music player.
#[derive( Parser, Debug )]
#[command( name = "cadence" )]
#[command( version, about, long_about = None )]
pub struct Args {
    /// Start with shuffle enabled.
    #[arg( long )]
    pub shuffle: bool,

    /// Loop mode to start in (off, all, one).
    #[arg( short, long = "loop", value_name = "MODE" )]
    pub loop_mode: Option<LoopMode>,

    /// Initial volume (0-100), overrides the settings file.
    #[arg( short, long )]
    pub volume: Option<f32>,

    /// Settings file to read instead of the default location.
    #[arg( long, value_name = "FILE" )]
    pub settings: Option<PathBuf>,

    /// Files or directories to add to the playlist; playback starts automatically.
    pub files: Vec<PathBuf>,
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_files_and_flags() {
        let args = Args::try_parse_from( [ "cadence", "--shuffle", "--loop", "all", "-v", "30", "a.mp3", "b.flac" ] ).unwrap();

        assert!( args.shuffle );
        assert_eq!( args.loop_mode, Some( LoopMode::RepeatAll ) );
        assert_eq!( args.volume, Some( 30.0 ) );
        assert_eq!( args.files, vec![ PathBuf::from( "a.mp3" ), PathBuf::from( "b.flac" ) ] );
    }


    #[test]
    fn test_rejects_unknown_loop_mode() {
        assert!( Args::try_parse_from( [ "cadence", "--loop", "forever" ] ).is_err() );
    }
}

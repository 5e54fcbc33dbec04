//! Command parsing
//!
//! Turns one line of user input into a [`Command`]. Track numbers are
//! entered 1-based and stored as 0-based playlist indices.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;


/// Errors that can occur during command parsing.
#[derive( Debug, Error, PartialEq )]
pub enum CommandError {
    #[error( "Unknown command: {0}. Type 'help' for commands." )]
    Unknown( String ),

    #[error( "Invalid argument: {0}" )]
    InvalidArgument( String ),

    #[error( "Missing argument: {0}" )]
    MissingArgument( String ),
}


/// Parsed user command.
#[derive( Debug, Clone, PartialEq )]
pub enum Command {
    // Playback commands
    Play,
    Pause,
    Stop,
    Next,
    Prev,
    Seek { position: Duration },
    FastForward,
    Rewind,

    // Volume commands
    Volume { level: f32 },
    VolumeUp,
    VolumeDown,

    // Mode commands
    Loop,
    Shuffle,

    // Playlist commands
    Add { path: PathBuf },
    Load { dir: PathBuf },
    List,
    Goto { index: usize },
    Remove { index: usize },
    Clear,

    // Session commands
    Status,
    Help,
    Quit,
}


impl Command {
    /// Parses a command line.
    ///
    /// Carriage returns, a leading byte-order mark and surrounding
    /// whitespace are ignored. Path arguments keep their inner spaces.
    ///
    /// @param input - The line to parse
    ///
    /// @returns The parsed command or an error
    pub fn parse( input: &str ) -> Result<Self, CommandError> {
        let cleaned = input.replace( '\r', "" );
        let input = cleaned.trim_start_matches( '\u{feff}' ).trim();

        let mut parts = input.splitn( 2, char::is_whitespace );
        let cmd = parts.next().unwrap_or( "" ).to_lowercase();
        let args = parts.next().map( str::trim ).filter( |s| !s.is_empty() );

        match cmd.as_str() {
            // Playback commands
            "play" | "p" => Ok( Command::Play ),
            "pause" | "pa" => Ok( Command::Pause ),
            "stop" | "s" => Ok( Command::Stop ),
            "next" | "n" => Ok( Command::Next ),
            "prev" | "previous" | "pr" => Ok( Command::Prev ),
            "seek" => {
                let time_str = args
                    .ok_or_else( || CommandError::MissingArgument( "time position".into() ) )?;
                let position = parse_time( time_str )?;
                Ok( Command::Seek { position } )
            }
            "ff" => Ok( Command::FastForward ),
            "rw" => Ok( Command::Rewind ),

            // Volume commands
            "vol" | "volume" => {
                let level_str = args
                    .ok_or_else( || CommandError::MissingArgument( "volume level (0-100)".into() ) )?;
                let level: f32 = level_str.parse()
                    .ok()
                    .filter( |v: &f32| v.is_finite() )
                    .ok_or_else( || CommandError::InvalidArgument( format!( "Invalid volume: {}", level_str ) ) )?;
                Ok( Command::Volume { level } )
            }
            "vol+" => Ok( Command::VolumeUp ),
            "vol-" => Ok( Command::VolumeDown ),

            // Mode commands
            "loop" => Ok( Command::Loop ),
            "shuffle" => Ok( Command::Shuffle ),

            // Playlist commands
            "add" => {
                let path = args
                    .ok_or_else( || CommandError::MissingArgument( "file path".into() ) )?;
                Ok( Command::Add { path: PathBuf::from( path ) } )
            }
            "load" => {
                let dir = args
                    .ok_or_else( || CommandError::MissingArgument( "directory".into() ) )?;
                Ok( Command::Load { dir: PathBuf::from( dir ) } )
            }
            "list" | "ls" => Ok( Command::List ),
            "goto" => Ok( Command::Goto { index: parse_track_number( args )? } ),
            "remove" | "rm" => Ok( Command::Remove { index: parse_track_number( args )? } ),
            "clear" => Ok( Command::Clear ),

            // Session commands
            "status" | "st" => Ok( Command::Status ),
            "help" | "h" => Ok( Command::Help ),
            "quit" | "q" | "exit" => Ok( Command::Quit ),

            "" => Err( CommandError::Unknown( "empty command".into() ) ),
            other => Err( CommandError::Unknown( other.to_string() ) ),
        }
    }
}


/// Parses a 1-based track number into a playlist index.
fn parse_track_number( args: Option<&str> ) -> Result<usize, CommandError> {
    let s = args.ok_or_else( || CommandError::MissingArgument( "track number".into() ) )?;
    let number: usize = s.parse()
        .map_err( |_| CommandError::InvalidArgument( format!( "Invalid track number: {}", s ) ) )?;

    number
        .checked_sub( 1 )
        .ok_or_else( || CommandError::InvalidArgument( "Track numbers start at 1".into() ) )
}


/// Parses a time string like "1:30" or "90" into a Duration.
///
/// @param s - Time string in format "MM:SS", "M:SS", or just seconds
///
/// @returns Duration or error
fn parse_time( s: &str ) -> Result<Duration, CommandError> {
    let s = s.trim();

    if let Some(( min, sec )) = s.split_once( ':' ) {
        let minutes: u64 = min.parse()
            .map_err( |_| CommandError::InvalidArgument( format!( "Invalid minutes: {}", min ) ) )?;
        let seconds: u64 = sec.parse()
            .map_err( |_| CommandError::InvalidArgument( format!( "Invalid seconds: {}", sec ) ) )?;
        let total = minutes
            .checked_mul( 60 )
            .and_then( |m| m.checked_add( seconds ) )
            .ok_or_else( || CommandError::InvalidArgument( format!( "Time out of range: {}", s ) ) )?;
        Ok( Duration::from_secs( total ) )
    } else {
        let seconds: f64 = s.parse()
            .map_err( |_| CommandError::InvalidArgument( format!( "Invalid time: {}", s ) ) )?;
        Duration::try_from_secs_f64( seconds )
            .map_err( |_| CommandError::InvalidArgument( format!( "Invalid time: {}", s ) ) )
    }
}


/// Returns help text listing all available commands.
pub fn help_text() -> &'static str {
    r#"=== Commands ===
  play, p          - Play/Resume
  pause, pa        - Pause
  stop, s          - Stop
  next, n          - Next track
  prev, pr         - Previous track (restarts the track after 3s)

  seek <time>      - Seek to position (seconds or m:ss)
  ff               - Fast forward
  rw               - Rewind

  vol <0-100>      - Set volume
  vol+ / vol-      - Volume up/down

  loop             - Cycle loop mode (Off/All/Single)
  shuffle          - Toggle shuffle mode

  add <file>       - Add file to playlist
  load <directory> - Load all audio files from directory
  list, ls         - Show playlist
  goto <number>    - Jump to track number
  remove <number>  - Remove track from playlist
  clear            - Clear playlist

  status, st       - Show current status
  help, h          - Show this help
  quit, q          - Exit player"#
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_playback_aliases() {
        assert_eq!( Command::parse( "p" ).unwrap(), Command::Play );
        assert_eq!( Command::parse( "pa" ).unwrap(), Command::Pause );
        assert_eq!( Command::parse( "s" ).unwrap(), Command::Stop );
        assert_eq!( Command::parse( "n" ).unwrap(), Command::Next );
        assert_eq!( Command::parse( "pr" ).unwrap(), Command::Prev );
        assert_eq!( Command::parse( "st" ).unwrap(), Command::Status );
        assert_eq!( Command::parse( "exit" ).unwrap(), Command::Quit );
    }


    #[test]
    fn test_parse_is_case_insensitive_and_trims() {
        assert_eq!( Command::parse( "  NEXT \r\n" ).unwrap(), Command::Next );
        assert_eq!( Command::parse( "\u{feff}play" ).unwrap(), Command::Play );
    }


    #[test]
    fn test_parse_add_keeps_spaces() {
        let cmd = Command::parse( "add /music/My Band/01 Intro.mp3" ).unwrap();
        assert_eq!( cmd, Command::Add { path: PathBuf::from( "/music/My Band/01 Intro.mp3" ) } );
    }


    #[test]
    fn test_parse_load() {
        let cmd = Command::parse( "load ~/Music" ).unwrap();
        assert_eq!( cmd, Command::Load { dir: PathBuf::from( "~/Music" ) } );
    }


    #[test]
    fn test_parse_seek() {
        let cmd = Command::parse( "seek 1:30" ).unwrap();
        assert_eq!( cmd, Command::Seek { position: Duration::from_secs( 90 ) } );

        let cmd = Command::parse( "seek 12.5" ).unwrap();
        assert_eq!( cmd, Command::Seek { position: Duration::from_millis( 12500 ) } );
    }


    #[test]
    fn test_parse_seek_rejects_negative() {
        let result = Command::parse( "seek -4" );
        assert!( matches!( result, Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_seek_rejects_overflow() {
        let result = Command::parse( "seek 1:18446744073709551615" );
        assert!( matches!( result, Err( CommandError::InvalidArgument( _ ) ) ) );

        let result = Command::parse( "seek 307445734561825861:00" );
        assert!( matches!( result, Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_volume() {
        assert_eq!( Command::parse( "vol 75" ).unwrap(), Command::Volume { level: 75.0 } );
        assert_eq!( Command::parse( "vol+" ).unwrap(), Command::VolumeUp );
        assert_eq!( Command::parse( "vol-" ).unwrap(), Command::VolumeDown );
        assert!( matches!( Command::parse( "vol loud" ), Err( CommandError::InvalidArgument( _ ) ) ) );
        assert!( matches!( Command::parse( "vol" ), Err( CommandError::MissingArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_track_numbers_are_one_based() {
        assert_eq!( Command::parse( "goto 1" ).unwrap(), Command::Goto { index: 0 } );
        assert_eq!( Command::parse( "remove 3" ).unwrap(), Command::Remove { index: 2 } );
        assert!( matches!( Command::parse( "goto 0" ), Err( CommandError::InvalidArgument( _ ) ) ) );
        assert!( matches!( Command::parse( "goto two" ), Err( CommandError::InvalidArgument( _ ) ) ) );
        assert!( matches!( Command::parse( "remove" ), Err( CommandError::MissingArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_unknown() {
        let result = Command::parse( "foobar" );
        assert_eq!( result, Err( CommandError::Unknown( "foobar".into() ) ) );
    }


    #[test]
    fn test_parse_missing_arg() {
        let result = Command::parse( "add" );
        assert!( matches!( result, Err( CommandError::MissingArgument( _ ) ) ) );
    }
}

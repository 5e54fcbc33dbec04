//! Interactive command loop
//!
//! Lines are read on a helper thread so the main thread can keep polling
//! the transport for end-of-track while the user is idle.

use std::io::{ self, BufRead, Write };
use std::sync::mpsc::{ self, RecvTimeoutError };
use std::thread;
use std::time::Duration;

use anyhow::{ Context, Result };
use cadence_core::command::help_text;
use cadence_core::transport::format_time;
use cadence_core::{ AudioBackend, Command, PlaybackState, TransportController };


const PROMPT: &str = "> ";


/// Runs the read-eval-print loop until `quit` or end of input.
///
/// @param controller - Transport to drive
/// @param poll_interval - Longest wait between end-of-track checks
pub fn run<B: AudioBackend>(
    controller: &mut TransportController<B>,
    poll_interval: Duration,
) -> Result<()> {
    let ( tx, rx ) = mpsc::channel::<String>();

    thread::Builder::new()
        .name( "cadence-stdin".into() )
        .spawn( move || {
            for line in io::stdin().lock().lines() {
                let Ok( line ) = line else { break };
                if tx.send( line ).is_err() {
                    break;
                }
            }
        })
        .context( "Failed to spawn input thread" )?;

    let mut out = io::stdout();
    prompt( &mut out )?;

    while controller.is_running() {
        match rx.recv_timeout( poll_interval ) {
            Ok( line ) => {
                handle_line( controller, &line, &mut out )?;
                report_poll( controller, &mut out )?;
                if controller.is_running() {
                    prompt( &mut out )?;
                }
            }
            Err( RecvTimeoutError::Timeout ) => report_poll( controller, &mut out )?,
            Err( RecvTimeoutError::Disconnected ) => {
                tracing::debug!( "Input closed" );
                break;
            }
        }
    }

    Ok(())
}


fn prompt<W: Write>( out: &mut W ) -> io::Result<()> {
    write!( out, "{}", PROMPT )?;
    out.flush()
}


/// Polls the transport and announces automatic track changes.
fn report_poll<B: AudioBackend, W: Write>(
    controller: &mut TransportController<B>,
    out: &mut W,
) -> io::Result<()> {
    match controller.poll() {
        Ok( true ) if controller.state() == PlaybackState::Playing => {
            writeln!( out )?;
            writeln!( out, "{}", now_playing( controller ) )?;
            prompt( out )
        }
        Ok( true ) => {
            writeln!( out )?;
            writeln!( out, "Playback finished" )?;
            prompt( out )
        }
        Ok( false ) => Ok(()),
        Err( e ) => {
            writeln!( out )?;
            writeln!( out, "Error: {}", e )?;
            prompt( out )
        }
    }
}


/// Parses and executes one line of input. Blank lines are ignored.
pub fn handle_line<B: AudioBackend, W: Write>(
    controller: &mut TransportController<B>,
    line: &str,
    out: &mut W,
) -> io::Result<()> {
    if line.trim().trim_start_matches( '\u{feff}' ).is_empty() {
        return Ok(());
    }

    match Command::parse( line ) {
        Ok( command ) => execute( controller, command, out ),
        Err( e ) => writeln!( out, "{}", e ),
    }
}


fn now_playing<B: AudioBackend>( controller: &TransportController<B> ) -> String {
    match controller.playlist().current() {
        Some( track ) => format!( "Now playing: {}", track.title() ),
        None => "Nothing to play".to_string(),
    }
}


/// Executes a parsed command and prints its outcome.
///
/// Failures are reported to `out`; only write errors are returned.
pub fn execute<B: AudioBackend, W: Write>(
    controller: &mut TransportController<B>,
    command: Command,
    out: &mut W,
) -> io::Result<()> {
    tracing::debug!( "Executing {:?}", command );

    let result = match command {
        Command::Play => controller.play().map( |_| now_playing( controller ) ),
        Command::Pause => {
            controller.pause();
            Ok( "Paused".to_string() )
        }
        Command::Stop => {
            controller.stop();
            Ok( "Stopped".to_string() )
        }
        Command::Next => controller.next().map( |_| now_playing( controller ) ),
        Command::Prev => controller.previous().map( |_| now_playing( controller ) ),
        Command::Seek { position } => controller
            .seek( position )
            .map( |_| format!( "Seeked to {}", format_time( position ) ) ),
        Command::FastForward => controller.fast_forward().map( |moved| {
            if moved {
                format!( "Fast forward to {}", format_time( controller.status().position ) )
            } else {
                "Already near the end of the track".to_string()
            }
        }),
        Command::Rewind => controller
            .rewind()
            .map( |_| format!( "Rewound to {}", format_time( controller.status().position ) ) ),

        Command::Volume { level } => {
            controller.set_volume( level );
            Ok( format!( "Volume: {}%", controller.volume().round() as i32 ) )
        }
        Command::VolumeUp => Ok( format!( "Volume: {}%", controller.volume_up().round() as i32 ) ),
        Command::VolumeDown => Ok( format!( "Volume: {}%", controller.volume_down().round() as i32 ) ),

        Command::Loop => Ok( format!( "Loop mode: {}", controller.toggle_loop_mode() ) ),
        Command::Shuffle => {
            let on = controller.toggle_shuffle();
            Ok( format!( "Shuffle: {}", if on { "On" } else { "Off" } ) )
        }

        Command::Add { path } => {
            let source = path.to_string_lossy().into_owned();
            controller.add_track( source.clone() );
            Ok( format!( "Added: {}", source ) )
        }
        Command::Load { dir } => controller
            .load_directory( &dir )
            .map( |count| format!( "Loaded {} tracks from {}", count, dir.display() ) ),
        Command::List => Ok( playlist_listing( controller ) ),
        Command::Goto { index } => controller.jump_to( index ).map( |_| now_playing( controller ) ),
        Command::Remove { index } => controller
            .remove_track( index )
            .map( |track| format!( "Removed: {}", track.title() ) ),
        Command::Clear => {
            controller.clear();
            Ok( "Playlist cleared".to_string() )
        }

        Command::Status => Ok( controller.status().to_string() ),
        Command::Help => Ok( help_text().to_string() ),
        Command::Quit => {
            controller.quit();
            Ok( "Goodbye!".to_string() )
        }
    };

    match result {
        Ok( message ) => writeln!( out, "{}", message ),
        Err( e ) => {
            tracing::warn!( "Command failed: {}", e );
            writeln!( out, "Error: {}", e )
        }
    }
}


/// Renders the playlist, marking the track under the cursor.
fn playlist_listing<B: AudioBackend>( controller: &TransportController<B> ) -> String {
    let playlist = controller.playlist();
    if playlist.is_empty() {
        return "Playlist is empty".to_string();
    }

    let current = playlist.current_track_index();
    let mut listing = format!( "=== Playlist ({} tracks) ===", playlist.len() );
    for ( i, track ) in playlist.tracks().iter().enumerate() {
        let marker = if current == Some( i ) { " > " } else { "   " };
        listing.push_str( &format!( "\n{}[{}] {}", marker, i + 1, track.title() ) );
    }
    listing
}


#[cfg( test )]
mod tests {
    use super::*;
    use std::path::{ Path, PathBuf };

    use cadence_core::backend::{ clamp_volume, EndCallback };
    use cadence_core::BackendError;


    /// Backend that accepts everything and makes no sound.
    #[derive( Default )]
    struct SilentBackend {
        file: Option<PathBuf>,
        state: PlaybackState,
        position: Duration,
        volume: f32,
    }


    impl AudioBackend for SilentBackend {
        fn load( &mut self, path: &Path ) -> Result<(), BackendError> {
            self.file = Some( path.to_path_buf() );
            self.state = PlaybackState::Stopped;
            self.position = Duration::ZERO;
            Ok(())
        }

        fn play( &mut self ) -> Result<(), BackendError> {
            if self.file.is_none() {
                return Err( BackendError::NoTrack );
            }
            self.state = PlaybackState::Playing;
            Ok(())
        }

        fn pause( &mut self ) {
            if self.state == PlaybackState::Playing {
                self.state = PlaybackState::Paused;
            }
        }

        fn stop( &mut self ) {
            self.state = PlaybackState::Stopped;
            self.position = Duration::ZERO;
        }

        fn seek( &mut self, position: Duration ) -> Result<(), BackendError> {
            self.position = position;
            Ok(())
        }

        fn position( &self ) -> Duration {
            self.position
        }

        fn duration( &self ) -> Duration {
            Duration::from_secs( 180 )
        }

        fn set_volume( &mut self, volume: f32 ) {
            self.volume = clamp_volume( volume );
        }

        fn volume( &self ) -> f32 {
            self.volume
        }

        fn state( &self ) -> PlaybackState {
            self.state
        }

        fn current_file( &self ) -> Option<&Path> {
            self.file.as_deref()
        }

        fn set_on_end( &mut self, _callback: EndCallback ) {}

        fn poll( &mut self ) {}
    }


    fn run_line( controller: &mut TransportController<SilentBackend>, line: &str ) -> String {
        let mut out = Vec::new();
        handle_line( controller, line, &mut out ).unwrap();
        String::from_utf8( out ).unwrap()
    }


    fn controller_with( tracks: &[ &str ] ) -> TransportController<SilentBackend> {
        let mut controller = TransportController::new( SilentBackend::default() );
        for t in tracks {
            controller.add_track( *t );
        }
        controller
    }


    #[test]
    fn test_blank_line_prints_nothing() {
        let mut controller = controller_with( &[] );
        assert_eq!( run_line( &mut controller, "   \r" ), "" );
    }


    #[test]
    fn test_unknown_command_reports_error() {
        let mut controller = controller_with( &[ "a.mp3" ] );
        let output = run_line( &mut controller, "dance" );

        assert!( output.contains( "Unknown command: dance" ) );
        assert_eq!( controller.state(), PlaybackState::Stopped );
    }


    #[test]
    fn test_play_on_empty_playlist_reports_error() {
        let mut controller = controller_with( &[] );
        let output = run_line( &mut controller, "play" );
        assert_eq!( output, "Error: Playlist is empty\n" );
    }


    #[test]
    fn test_next_announces_track() {
        let mut controller = controller_with( &[ "/music/a.mp3", "/music/b.mp3" ] );
        run_line( &mut controller, "play" );

        let output = run_line( &mut controller, "n" );

        assert_eq!( output, "Now playing: b\n" );
        assert_eq!( controller.state(), PlaybackState::Playing );
    }


    #[test]
    fn test_goto_out_of_range() {
        let mut controller = controller_with( &[ "a.mp3", "b.mp3" ] );
        let output = run_line( &mut controller, "goto 5" );

        assert_eq!( output, "Error: Invalid track number: 5\n" );
        assert_eq!( controller.playlist().current_index(), Some( 0 ) );
    }


    #[test]
    fn test_list_marks_current_track() {
        let mut controller = controller_with( &[ "a.mp3", "b.mp3" ] );
        run_line( &mut controller, "goto 2" );

        let output = run_line( &mut controller, "list" );

        assert!( output.contains( "   [1] a" ) );
        assert!( output.contains( " > [2] b" ) );
    }


    #[test]
    fn test_volume_commands() {
        let mut controller = controller_with( &[] );
        assert_eq!( run_line( &mut controller, "vol 150" ), "Volume: 100%\n" );
        assert_eq!( run_line( &mut controller, "vol-" ), "Volume: 95%\n" );
    }


    #[test]
    fn test_loop_cycles() {
        let mut controller = controller_with( &[] );
        assert_eq!( run_line( &mut controller, "loop" ), "Loop mode: All\n" );
        assert_eq!( run_line( &mut controller, "loop" ), "Loop mode: Single\n" );
        assert_eq!( run_line( &mut controller, "loop" ), "Loop mode: Off\n" );
    }


    #[test]
    fn test_quit_stops_running() {
        let mut controller = controller_with( &[] );
        run_line( &mut controller, "quit" );
        assert!( !controller.is_running() );
    }
}

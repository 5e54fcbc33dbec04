//! Transport control
//!
//! The TransportController owns the playlist and the audio backend, and
//! decides what happens when the user issues a command or a track ends.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::backend::{ AudioBackend, BackendError, PlaybackState };
use crate::library::LibraryError;
use crate::playlist::{ Playlist, Track };


/// Errors that can occur while driving the transport.
#[derive( Debug, Error )]
pub enum TransportError {
    #[error( "Playlist is empty" )]
    EmptyPlaylist,

    #[error( "Invalid track number: {}", .index + 1 )]
    IndexOutOfRange { index: usize, len: usize },

    #[error( "Cannot seek to {} (track length {})", format_time( *.position ), format_time( *.duration ) )]
    SeekOutOfRange { position: Duration, duration: Duration },

    #[error( transparent )]
    Backend( #[from] BackendError ),

    #[error( transparent )]
    Library( #[from] LibraryError ),
}


/// What to do when a track finishes on its own.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum LoopMode {
    #[default]
    Off,
    RepeatAll,
    RepeatOne,
}


impl LoopMode {
    /// The mode a toggle moves to: Off → RepeatAll → RepeatOne → Off.
    pub fn next( self ) -> Self {
        match self {
            LoopMode::Off => LoopMode::RepeatAll,
            LoopMode::RepeatAll => LoopMode::RepeatOne,
            LoopMode::RepeatOne => LoopMode::Off,
        }
    }
}


impl fmt::Display for LoopMode {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        let name = match self {
            LoopMode::Off => "Off",
            LoopMode::RepeatAll => "All",
            LoopMode::RepeatOne => "Single",
        };
        f.write_str( name )
    }
}


impl FromStr for LoopMode {
    type Err = String;


    fn from_str( s: &str ) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" | "none" | "0" => Ok( LoopMode::Off ),
            "all" | "repeat-all" | "1" => Ok( LoopMode::RepeatAll ),
            "one" | "single" | "repeat-one" | "2" => Ok( LoopMode::RepeatOne ),
            _ => Err( format!( "Invalid loop mode: '{}'. Use 'off', 'all', or 'one'", s ) ),
        }
    }
}


/// Tunable steps and thresholds.
#[derive( Debug, Clone, Copy, PartialEq )]
pub struct TransportOptions {
    /// Distance moved by fast forward / rewind.
    pub seek_step: Duration,
    /// Volume change applied by volume up / down.
    pub volume_step: f32,
    /// Past this position, "previous" restarts the current track.
    pub restart_threshold: Duration,
}


impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            seek_step: Duration::from_secs( 10 ),
            volume_step: 5.0,
            restart_threshold: Duration::from_secs( 3 ),
        }
    }
}


/// Snapshot of the player for display.
#[derive( Debug, Clone, PartialEq )]
pub struct Status {
    pub title: Option<String>,
    pub state: PlaybackState,
    pub position: Duration,
    pub duration: Duration,
    pub volume: f32,
    pub loop_mode: LoopMode,
    pub shuffle: bool,
    pub cursor: Option<usize>,
    pub track_count: usize,
}


impl fmt::Display for Status {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        if let Some( title ) = &self.title {
            writeln!( f, "Now Playing: {}", title )?;
        }

        write!(
            f,
            "Status: {} | {} / {} | Volume: {}% | Loop: {}",
            self.state,
            format_time( self.position ),
            format_time( self.duration ),
            self.volume.round() as i32,
            self.loop_mode,
        )?;

        if self.shuffle {
            write!( f, " | Shuffle: On" )?;
        }

        write!(
            f,
            " | Track {}/{}",
            self.cursor.map_or( 0, |i| i + 1 ),
            self.track_count,
        )
    }
}


/// Formats a duration as `mm:ss`.
pub fn format_time( duration: Duration ) -> String {
    let secs = duration.as_secs();
    format!( "{:02}:{:02}", secs / 60, secs % 60 )
}


/// Drives an [`AudioBackend`] from a [`Playlist`].
///
/// All methods run to completion on the caller's thread. End-of-track is
/// only acted upon inside [`TransportController::poll`].
pub struct TransportController<B: AudioBackend> {
    backend: B,
    playlist: Playlist,
    loop_mode: LoopMode,
    options: TransportOptions,
    running: bool,
    /// Raised by the backend's end callback, consumed by `poll`
    track_ended: Arc<AtomicBool>,
}


impl<B: AudioBackend> TransportController<B> {
    /// Creates a controller with default options and an empty playlist.
    pub fn new( backend: B ) -> Self {
        Self::with_options( backend, Playlist::new(), TransportOptions::default() )
    }


    /// Creates a controller around an existing playlist.
    pub fn with_options( mut backend: B, playlist: Playlist, options: TransportOptions ) -> Self {
        let track_ended = Arc::new( AtomicBool::new( false ) );
        let flag = Arc::clone( &track_ended );
        backend.set_on_end( Box::new( move || flag.store( true, Ordering::SeqCst ) ) );

        Self {
            backend,
            playlist,
            loop_mode: LoopMode::Off,
            options,
            running: true,
            track_ended,
        }
    }


    pub fn playlist( &self ) -> &Playlist {
        &self.playlist
    }


    pub fn playlist_mut( &mut self ) -> &mut Playlist {
        &mut self.playlist
    }


    pub fn backend( &self ) -> &B {
        &self.backend
    }


    pub fn backend_mut( &mut self ) -> &mut B {
        &mut self.backend
    }


    pub fn options( &self ) -> &TransportOptions {
        &self.options
    }


    /// Loads and starts the playlist's current track.
    ///
    /// A load failure leaves the cursor where it is and playback stopped.
    pub fn play_current_track( &mut self ) -> Result<(), TransportError> {
        let track = self.playlist.current().ok_or( TransportError::EmptyPlaylist )?;
        let title = track.title().to_string();
        let path = track.path().to_path_buf();

        if let Err( e ) = self.backend.load( &path ) {
            tracing::warn!( "Could not load {:?}: {}", path, e );
            return Err( e.into() );
        }
        self.backend.play()?;

        tracing::info!( "Playing: {}", title );
        Ok(())
    }


    /// Starts playback, resuming if paused.
    pub fn play( &mut self ) -> Result<(), TransportError> {
        if self.backend.state() == PlaybackState::Stopped {
            self.play_current_track()
        } else {
            self.backend.play()?;
            Ok(())
        }
    }


    pub fn pause( &mut self ) {
        self.backend.pause();
    }


    pub fn stop( &mut self ) {
        self.backend.stop();
    }


    /// Pauses when playing, resumes when paused, otherwise starts the current track.
    pub fn toggle_play_pause( &mut self ) -> Result<(), TransportError> {
        if self.backend.is_playing() {
            self.backend.pause();
        } else if self.backend.state() == PlaybackState::Paused {
            self.backend.play()?;
        } else {
            self.play_current_track()?;
        }
        Ok(())
    }


    /// Advances to the next track and plays it.
    pub fn next( &mut self ) -> Result<(), TransportError> {
        if self.playlist.next().is_none() {
            return Err( TransportError::EmptyPlaylist );
        }
        self.play_current_track()
    }


    /// Restarts the current track if it has played past the restart
    /// threshold, otherwise goes back one track and plays it.
    pub fn previous( &mut self ) -> Result<(), TransportError> {
        if self.backend.position() > self.options.restart_threshold {
            self.backend.seek( Duration::ZERO )?;
            return Ok(());
        }

        if self.playlist.previous().is_none() {
            return Err( TransportError::EmptyPlaylist );
        }
        self.play_current_track()
    }


    /// Jumps to a playlist position and plays it.
    pub fn jump_to( &mut self, index: usize ) -> Result<(), TransportError> {
        if self.playlist.jump_to( index ).is_none() {
            return Err( TransportError::IndexOutOfRange { index, len: self.playlist.len() } );
        }
        self.play_current_track()
    }


    /// Seeks to an absolute position in the current track.
    pub fn seek( &mut self, position: Duration ) -> Result<(), TransportError> {
        let duration = self.backend.duration();
        if !duration.is_zero() && position >= duration {
            return Err( TransportError::SeekOutOfRange { position, duration } );
        }
        self.backend.seek( position )?;
        Ok(())
    }


    /// Skips ahead by `delta`. Returns false (and does nothing) if that
    /// would land at or past the end of a track of known length.
    pub fn seek_forward( &mut self, delta: Duration ) -> Result<bool, TransportError> {
        let target = self.backend.position().saturating_add( delta );
        let duration = self.backend.duration();
        if !duration.is_zero() && target >= duration {
            tracing::debug!( "Fast forward past end ignored" );
            return Ok( false );
        }
        self.backend.seek( target )?;
        Ok( true )
    }


    /// Skips back by `delta`, stopping at the start of the track.
    pub fn seek_backward( &mut self, delta: Duration ) -> Result<(), TransportError> {
        let target = self.backend.position().saturating_sub( delta );
        self.backend.seek( target )?;
        Ok(())
    }


    /// Fast forward by the configured seek step.
    pub fn fast_forward( &mut self ) -> Result<bool, TransportError> {
        self.seek_forward( self.options.seek_step )
    }


    /// Rewind by the configured seek step.
    pub fn rewind( &mut self ) -> Result<(), TransportError> {
        self.seek_backward( self.options.seek_step )
    }


    /// Sets the volume; the backend clamps it to 0-100.
    pub fn set_volume( &mut self, volume: f32 ) {
        self.backend.set_volume( volume );
    }


    pub fn volume( &self ) -> f32 {
        self.backend.volume()
    }


    pub fn volume_up( &mut self ) -> f32 {
        self.set_volume( self.volume() + self.options.volume_step );
        self.volume()
    }


    pub fn volume_down( &mut self ) -> f32 {
        self.set_volume( self.volume() - self.options.volume_step );
        self.volume()
    }


    pub fn loop_mode( &self ) -> LoopMode {
        self.loop_mode
    }


    pub fn set_loop_mode( &mut self, mode: LoopMode ) {
        self.loop_mode = mode;
    }


    /// Cycles Off → RepeatAll → RepeatOne → Off.
    pub fn toggle_loop_mode( &mut self ) -> LoopMode {
        self.loop_mode = self.loop_mode.next();
        tracing::debug!( "Loop mode: {:?}", self.loop_mode );
        self.loop_mode
    }


    /// Flips shuffle mode and returns the new setting.
    pub fn toggle_shuffle( &mut self ) -> bool {
        let shuffle = !self.playlist.shuffle();
        self.playlist.set_shuffle( shuffle );
        shuffle
    }


    pub fn add_track( &mut self, source: impl Into<String> ) {
        self.playlist.add( source );
    }


    /// Appends a track and plays the playlist's current track.
    pub fn add_and_play( &mut self, source: impl Into<String> ) -> Result<(), TransportError> {
        self.playlist.add( source );
        self.play_current_track()
    }


    /// Removes a track from the playlist.
    pub fn remove_track( &mut self, index: usize ) -> Result<Track, TransportError> {
        let len = self.playlist.len();
        self.playlist
            .remove( index )
            .ok_or( TransportError::IndexOutOfRange { index, len } )
    }


    /// Adds every audio file in `dir` to the playlist.
    pub fn load_directory( &mut self, dir: &Path ) -> Result<usize, TransportError> {
        Ok( self.playlist.load_from_directory( dir )? )
    }


    /// Empties the playlist and stops playback.
    pub fn clear( &mut self ) {
        self.playlist.clear();
        self.backend.stop();
    }


    pub fn state( &self ) -> PlaybackState {
        self.backend.state()
    }


    pub fn status( &self ) -> Status {
        Status {
            title: self.playlist.current().map( |t| t.title().to_string() ),
            state: self.backend.state(),
            position: self.backend.position(),
            duration: self.backend.duration(),
            volume: self.backend.volume(),
            loop_mode: self.loop_mode,
            shuffle: self.playlist.shuffle(),
            cursor: self.playlist.current_index(),
            track_count: self.playlist.len(),
        }
    }


    pub fn is_running( &self ) -> bool {
        self.running
    }


    pub fn quit( &mut self ) {
        self.running = false;
    }


    /// Lets the backend check for end-of-track and reacts to it.
    ///
    /// @returns true if a track ended during this poll
    pub fn poll( &mut self ) -> Result<bool, TransportError> {
        self.backend.poll();

        if !self.track_ended.swap( false, Ordering::SeqCst ) {
            return Ok( false );
        }

        tracing::debug!( "Track ended, loop mode {:?}", self.loop_mode );
        self.on_track_end()?;
        Ok( true )
    }


    /// Decides what plays after a track finished on its own.
    pub fn on_track_end( &mut self ) -> Result<(), TransportError> {
        match self.loop_mode {
            LoopMode::RepeatOne => {
                self.backend.seek( Duration::ZERO )?;
                self.backend.play()?;
                Ok(())
            }
            LoopMode::RepeatAll => {
                self.playlist.next();
                self.play_current_track()
            }
            LoopMode::Off => {
                if self.playlist.is_at_end() {
                    tracing::info!( "Reached end of playlist" );
                    self.backend.stop();
                    Ok(())
                } else {
                    self.playlist.next();
                    self.play_current_track()
                }
            }
        }
    }
}


impl<B: AudioBackend> Drop for TransportController<B> {
    fn drop( &mut self ) {
        self.backend.stop();
    }
}


#[cfg( test )]
mod tests {
    use super::*;

    use std::collections::{ HashMap, HashSet };
    use std::path::PathBuf;

    use crate::backend::{ clamp_volume, EndCallback };


    /// In-memory backend that records calls and lets tests end tracks.
    #[derive( Default )]
    struct ScriptedBackend {
        state: PlaybackState,
        loaded: Option<PathBuf>,
        position: Duration,
        volume: f32,
        durations: HashMap<PathBuf, Duration>,
        broken: HashSet<PathBuf>,
        calls: Vec<String>,
        on_end: Option<EndCallback>,
        finished: bool,
    }


    impl ScriptedBackend {
        fn new() -> Self {
            Self { volume: 50.0, ..Self::default() }
        }


        /// Marks the playing track as finished; reported on the next poll.
        fn finish( &mut self ) {
            self.finished = true;
        }


        fn set_position( &mut self, secs: f64 ) {
            self.position = Duration::from_secs_f64( secs );
        }


        fn clear_calls( &mut self ) {
            self.calls.clear();
        }
    }


    impl AudioBackend for ScriptedBackend {
        fn load( &mut self, path: &Path ) -> Result<(), BackendError> {
            self.calls.push( format!( "load {}", path.display() ) );
            self.state = PlaybackState::Stopped;
            self.position = Duration::ZERO;

            if self.broken.contains( path ) {
                self.loaded = None;
                return Err( BackendError::Load {
                    path: path.to_path_buf(),
                    reason: "unsupported format".into(),
                });
            }

            self.loaded = Some( path.to_path_buf() );
            Ok(())
        }


        fn play( &mut self ) -> Result<(), BackendError> {
            self.calls.push( "play".into() );
            if self.loaded.is_none() {
                return Err( BackendError::NoTrack );
            }
            self.state = PlaybackState::Playing;
            Ok(())
        }


        fn pause( &mut self ) {
            self.calls.push( "pause".into() );
            if self.state == PlaybackState::Playing {
                self.state = PlaybackState::Paused;
            }
        }


        fn stop( &mut self ) {
            self.calls.push( "stop".into() );
            self.state = PlaybackState::Stopped;
            self.position = Duration::ZERO;
        }


        fn seek( &mut self, position: Duration ) -> Result<(), BackendError> {
            self.calls.push( format!( "seek {}", position.as_secs_f64() ) );
            self.position = position;
            Ok(())
        }


        fn position( &self ) -> Duration {
            self.position
        }


        fn duration( &self ) -> Duration {
            self.loaded
                .as_ref()
                .and_then( |p| self.durations.get( p ) )
                .copied()
                .unwrap_or( Duration::from_secs( 180 ) )
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
            self.loaded.as_deref()
        }


        fn set_on_end( &mut self, callback: EndCallback ) {
            self.on_end = Some( callback );
        }


        fn poll( &mut self ) {
            if self.finished && self.state == PlaybackState::Playing {
                self.finished = false;
                self.state = PlaybackState::Stopped;
                // The playhead stays at the end until someone seeks
                self.position = self.duration();
                if let Some( callback ) = self.on_end.as_mut() {
                    callback();
                }
            }
        }
    }


    fn controller_with( names: &[&str] ) -> TransportController<ScriptedBackend> {
        let mut playlist = Playlist::with_seed( 11 );
        playlist.add_many( names.iter().copied() );
        TransportController::with_options( ScriptedBackend::new(), playlist, TransportOptions::default() )
    }


    fn loaded( controller: &TransportController<ScriptedBackend> ) -> Option<String> {
        controller.backend().current_file().map( |p| p.display().to_string() )
    }


    #[test]
    fn test_play_current_track_loads_and_plays() {
        let mut controller = controller_with( &[ "A", "B" ] );

        controller.play_current_track().unwrap();

        assert_eq!( controller.backend().calls, vec![ "load A", "play" ] );
        assert_eq!( controller.state(), PlaybackState::Playing );
    }


    #[test]
    fn test_play_current_track_on_empty_playlist() {
        let mut controller = controller_with( &[] );

        let result = controller.play_current_track();

        assert!( matches!( result, Err( TransportError::EmptyPlaylist ) ) );
        assert!( controller.backend().calls.is_empty() );
    }


    #[test]
    fn test_load_failure_keeps_cursor_and_stays_stopped() {
        let mut controller = controller_with( &[ "A", "broken" ] );
        controller.backend_mut().broken.insert( PathBuf::from( "broken" ) );

        let result = controller.next();

        assert!( matches!( result, Err( TransportError::Backend( BackendError::Load { .. } ) ) ) );
        assert_eq!( controller.playlist().current_index(), Some( 1 ) );
        assert_eq!( controller.state(), PlaybackState::Stopped );
        assert!( !controller.backend().calls.contains( &"play".to_string() ) );
    }


    #[test]
    fn test_toggle_play_pause() {
        let mut controller = controller_with( &[ "A" ] );

        controller.toggle_play_pause().unwrap();
        assert_eq!( controller.state(), PlaybackState::Playing );

        controller.toggle_play_pause().unwrap();
        assert_eq!( controller.state(), PlaybackState::Paused );

        controller.backend_mut().clear_calls();
        controller.toggle_play_pause().unwrap();
        assert_eq!( controller.state(), PlaybackState::Playing );
        assert_eq!( controller.backend().calls, vec![ "play" ] );
    }


    #[test]
    fn test_play_resumes_when_paused() {
        let mut controller = controller_with( &[ "A", "B" ] );
        controller.play().unwrap();
        controller.pause();
        controller.backend_mut().clear_calls();

        controller.play().unwrap();

        assert_eq!( controller.backend().calls, vec![ "play" ] );
        assert_eq!( controller.state(), PlaybackState::Playing );
    }


    #[test]
    fn test_next_on_empty_playlist_is_noop() {
        let mut controller = controller_with( &[] );

        assert!( matches!( controller.next(), Err( TransportError::EmptyPlaylist ) ) );
        assert!( matches!( controller.previous(), Err( TransportError::EmptyPlaylist ) ) );
        assert!( controller.backend().calls.is_empty() );
    }


    #[test]
    fn test_previous_restarts_after_threshold() {
        let mut controller = controller_with( &[ "A", "B" ] );
        controller.jump_to( 1 ).unwrap();
        controller.backend_mut().set_position( 5.0 );
        controller.backend_mut().clear_calls();

        controller.previous().unwrap();

        assert_eq!( controller.backend().calls, vec![ "seek 0" ] );
        assert_eq!( controller.playlist().current_index(), Some( 1 ) );
    }


    #[test]
    fn test_previous_switches_track_before_threshold() {
        let mut controller = controller_with( &[ "A", "B" ] );
        controller.jump_to( 1 ).unwrap();
        controller.backend_mut().set_position( 1.0 );

        controller.previous().unwrap();

        assert_eq!( controller.playlist().current_index(), Some( 0 ) );
        assert_eq!( loaded( &controller ).as_deref(), Some( "A" ) );
    }


    #[test]
    fn test_jump_to_out_of_range() {
        let mut controller = controller_with( &[ "A", "B", "C" ] );
        controller.playlist_mut().jump_to( 1 );

        let result = controller.jump_to( 3 );

        assert!( matches!( result, Err( TransportError::IndexOutOfRange { index: 3, len: 3 } ) ) );
        assert_eq!( controller.playlist().current_index(), Some( 1 ) );
        assert!( controller.backend().calls.is_empty() );
    }


    #[test]
    fn test_seek_forward_rejects_past_end() {
        let mut controller = controller_with( &[ "A" ] );
        controller.backend_mut().durations.insert( PathBuf::from( "A" ), Duration::from_secs( 30 ) );
        controller.play().unwrap();
        controller.backend_mut().set_position( 25.0 );

        assert!( !controller.fast_forward().unwrap() );
        assert_eq!( controller.backend().position(), Duration::from_secs( 25 ) );

        controller.backend_mut().set_position( 12.0 );
        assert!( controller.fast_forward().unwrap() );
        assert_eq!( controller.backend().position(), Duration::from_secs( 22 ) );
    }


    #[test]
    fn test_seek_forward_huge_step_does_not_overflow() {
        let options = TransportOptions { seek_step: Duration::MAX, ..TransportOptions::default() };
        let mut controller = TransportController::with_options( ScriptedBackend::new(), Playlist::with_seed( 3 ), options );
        controller.add_track( "A" );
        controller.play().unwrap();
        controller.backend_mut().set_position( 10.0 );

        assert!( !controller.fast_forward().unwrap() );
        assert_eq!( controller.backend().position(), Duration::from_secs( 10 ) );
    }


    #[test]
    fn test_seek_backward_clamps_to_zero() {
        let mut controller = controller_with( &[ "A" ] );
        controller.play().unwrap();
        controller.backend_mut().set_position( 4.0 );

        controller.rewind().unwrap();
        assert_eq!( controller.backend().position(), Duration::ZERO );

        controller.backend_mut().set_position( 40.0 );
        controller.seek_backward( Duration::from_secs( 15 ) ).unwrap();
        assert_eq!( controller.backend().position(), Duration::from_secs( 25 ) );
    }


    #[test]
    fn test_absolute_seek_past_duration_rejected() {
        let mut controller = controller_with( &[ "A" ] );
        controller.play().unwrap();

        let result = controller.seek( Duration::from_secs( 500 ) );
        assert!( matches!( result, Err( TransportError::SeekOutOfRange { .. } ) ) );

        controller.seek( Duration::from_secs( 90 ) ).unwrap();
        assert_eq!( controller.backend().position(), Duration::from_secs( 90 ) );
    }


    #[test]
    fn test_volume_is_clamped() {
        let mut controller = controller_with( &[] );

        controller.set_volume( 150.0 );
        assert_eq!( controller.volume(), 100.0 );

        controller.set_volume( 2.0 );
        assert_eq!( controller.volume_down(), 0.0 );
        assert_eq!( controller.volume_up(), 5.0 );
    }


    #[test]
    fn test_loop_mode_cycle() {
        let mut controller = controller_with( &[] );
        assert_eq!( controller.loop_mode(), LoopMode::Off );

        assert_eq!( controller.toggle_loop_mode(), LoopMode::RepeatAll );
        assert_eq!( controller.toggle_loop_mode(), LoopMode::RepeatOne );
        assert_eq!( controller.toggle_loop_mode(), LoopMode::Off );

        for start in [ LoopMode::Off, LoopMode::RepeatAll, LoopMode::RepeatOne ] {
            assert_eq!( start.next().next().next(), start );
        }
    }


    #[test]
    fn test_loop_mode_parse() {
        assert_eq!( "ALL".parse::<LoopMode>(), Ok( LoopMode::RepeatAll ) );
        assert_eq!( "one".parse::<LoopMode>(), Ok( LoopMode::RepeatOne ) );
        assert_eq!( "off".parse::<LoopMode>(), Ok( LoopMode::Off ) );
        assert!( "sometimes".parse::<LoopMode>().is_err() );
    }


    #[test]
    fn test_end_at_last_track_with_loop_off_stops() {
        let mut controller = controller_with( &[ "A", "B", "C" ] );
        controller.jump_to( 2 ).unwrap();
        controller.backend_mut().clear_calls();

        controller.backend_mut().finish();
        assert!( controller.poll().unwrap() );

        assert_eq!( controller.backend().calls, vec![ "stop" ] );
        assert_eq!( controller.playlist().current_index(), Some( 2 ) );
        assert_eq!( controller.state(), PlaybackState::Stopped );
    }


    #[test]
    fn test_end_mid_playlist_with_loop_off_advances() {
        let mut controller = controller_with( &[ "A", "B", "C" ] );
        controller.play().unwrap();

        controller.backend_mut().finish();
        controller.poll().unwrap();

        assert_eq!( controller.playlist().current_index(), Some( 1 ) );
        assert_eq!( loaded( &controller ).as_deref(), Some( "B" ) );
        assert_eq!( controller.state(), PlaybackState::Playing );
    }


    #[test]
    fn test_end_with_repeat_all_wraps() {
        let mut controller = controller_with( &[ "A", "B" ] );
        controller.set_loop_mode( LoopMode::RepeatAll );
        controller.jump_to( 1 ).unwrap();
        controller.backend_mut().clear_calls();

        controller.backend_mut().finish();
        controller.poll().unwrap();

        assert_eq!( controller.playlist().current_index(), Some( 0 ) );
        assert_eq!( controller.backend().calls, vec![ "load A", "play" ] );
    }


    #[test]
    fn test_end_with_repeat_one_replays() {
        let mut controller = controller_with( &[ "A", "B" ] );
        controller.set_loop_mode( LoopMode::RepeatOne );
        controller.play().unwrap();

        for _ in 0..3 {
            controller.backend_mut().clear_calls();
            controller.backend_mut().set_position( 170.0 );
            controller.backend_mut().finish();
            controller.poll().unwrap();

            assert_eq!( controller.backend().calls, vec![ "seek 0", "play" ] );
            assert_eq!( controller.backend().position(), Duration::ZERO );
            assert_eq!( controller.state(), PlaybackState::Playing );
            assert_eq!( controller.playlist().current_index(), Some( 0 ) );
            assert_eq!( loaded( &controller ).as_deref(), Some( "A" ) );
        }
    }


    #[test]
    fn test_poll_without_end_does_nothing() {
        let mut controller = controller_with( &[ "A" ] );
        controller.play().unwrap();
        controller.backend_mut().clear_calls();

        assert!( !controller.poll().unwrap() );
        assert!( controller.backend().calls.is_empty() );
        assert_eq!( controller.state(), PlaybackState::Playing );
    }


    #[test]
    fn test_end_is_not_reported_after_manual_stop() {
        let mut controller = controller_with( &[ "A", "B" ] );
        controller.play().unwrap();
        controller.backend_mut().finish();
        controller.stop();

        assert!( !controller.poll().unwrap() );
        assert_eq!( controller.playlist().current_index(), Some( 0 ) );
    }


    #[test]
    fn test_remove_track() {
        let mut controller = controller_with( &[ "A", "B", "C" ] );

        let result = controller.remove_track( 5 );
        assert!( matches!( result, Err( TransportError::IndexOutOfRange { index: 5, len: 3 } ) ) );
        assert_eq!( controller.playlist().len(), 3 );

        let removed = controller.remove_track( 1 ).unwrap();
        assert_eq!( removed.title(), "B" );
        assert_eq!( controller.playlist().len(), 2 );
    }


    #[test]
    fn test_clear_stops_playback() {
        let mut controller = controller_with( &[ "A", "B" ] );
        controller.play().unwrap();

        controller.clear();

        assert!( controller.playlist().is_empty() );
        assert_eq!( controller.state(), PlaybackState::Stopped );
    }


    #[test]
    fn test_toggle_shuffle() {
        let mut controller = controller_with( &[ "A", "B", "C" ] );

        assert!( controller.toggle_shuffle() );
        assert!( controller.playlist().shuffle() );
        assert!( !controller.toggle_shuffle() );
    }


    #[test]
    fn test_add_and_play_first_track() {
        let mut controller = controller_with( &[] );

        controller.add_and_play( "song.mp3" ).unwrap();

        assert_eq!( loaded( &controller ).as_deref(), Some( "song.mp3" ) );
        assert_eq!( controller.state(), PlaybackState::Playing );
    }


    #[test]
    fn test_status_display() {
        let mut controller = controller_with( &[ "/music/A.mp3", "/music/B.mp3" ] );
        controller.play().unwrap();
        controller.backend_mut().set_position( 65.0 );
        controller.set_loop_mode( LoopMode::RepeatAll );

        let status = controller.status();
        assert_eq!( status.cursor, Some( 0 ) );
        assert_eq!( status.track_count, 2 );

        let text = status.to_string();
        assert_eq!(
            text,
            "Now Playing: A\nStatus: Playing | 01:05 / 03:00 | Volume: 50% | Loop: All | Track 1/2"
        );
    }


    #[test]
    fn test_quit_clears_running_flag() {
        let mut controller = controller_with( &[] );
        assert!( controller.is_running() );
        controller.quit();
        assert!( !controller.is_running() );
    }


    #[test]
    fn test_format_time() {
        assert_eq!( format_time( Duration::ZERO ), "00:00" );
        assert_eq!( format_time( Duration::from_secs_f64( 125.9 ) ), "02:05" );
    }
}

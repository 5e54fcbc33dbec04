//! Playlist management
//!
//! Handles track ordering, the playback cursor and the shuffle permutation.
//!
//! The cursor always indexes into the permutation. With shuffle off the
//! permutation is the identity, so the cursor addresses tracks directly.
//! With shuffle on, the same cursor resolves through the permutation, which
//! means toggling shuffle can change what [`Playlist::current`] returns
//! without the cursor moving.

use std::path::{ Path, PathBuf };
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::library::{ self, LibraryError };


/// A single entry in the playlist.
#[derive( Debug, Clone, PartialEq )]
pub struct Track {
    source: String,
    title: String,
    artist: Option<String>,
    duration: Duration,
}


impl Track {
    /// Creates a track from a source reference, deriving the title from it.
    pub fn new( source: impl Into<String> ) -> Self {
        let source = source.into();
        let title = title_from_source( &source );
        Self {
            source,
            title,
            artist: None,
            duration: Duration::ZERO,
        }
    }


    pub fn with_title( mut self, title: impl Into<String> ) -> Self {
        self.title = title.into();
        self
    }


    pub fn with_artist( mut self, artist: impl Into<String> ) -> Self {
        self.artist = Some( artist.into() );
        self
    }


    pub fn with_duration( mut self, duration: Duration ) -> Self {
        self.duration = duration;
        self
    }


    /// The source reference (usually a file path) this track was built from.
    pub fn source( &self ) -> &str {
        &self.source
    }


    /// The source reference as a filesystem path.
    pub fn path( &self ) -> &Path {
        Path::new( &self.source )
    }


    pub fn title( &self ) -> &str {
        &self.title
    }


    pub fn artist( &self ) -> Option<&str> {
        self.artist.as_deref()
    }


    /// Duration of the track, zero if unknown.
    pub fn duration( &self ) -> Duration {
        self.duration
    }
}


/// Derives a display title: the file name without its last extension.
fn title_from_source( source: &str ) -> String {
    let file_name = source
        .rsplit( |c| c == '/' || c == '\\' )
        .next()
        .unwrap_or( source );

    match file_name.rfind( '.' ) {
        Some( dot ) => file_name[ ..dot ].to_string(),
        None => file_name.to_string(),
    }
}


/// Ordered track list with a cursor and an optional shuffle order.
#[derive( Debug )]
pub struct Playlist {
    tracks: Vec<Track>,
    current_index: Option<usize>,
    shuffle: bool,
    // Permutation of track indices, addressed by the cursor
    shuffle_order: Vec<usize>,
    rng: StdRng,
}


impl Default for Playlist {
    fn default() -> Self {
        Self::new()
    }
}


impl Playlist {
    /// Creates a new empty playlist seeded from system entropy.
    pub fn new() -> Self {
        Self::with_rng( StdRng::from_entropy() )
    }


    /// Creates a new empty playlist with a fixed shuffle seed.
    pub fn with_seed( seed: u64 ) -> Self {
        Self::with_rng( StdRng::seed_from_u64( seed ) )
    }


    fn with_rng( rng: StdRng ) -> Self {
        Self {
            tracks: Vec::new(),
            current_index: None,
            shuffle: false,
            shuffle_order: Vec::new(),
            rng,
        }
    }


    /// Adds a track built from a source reference to the end of the playlist.
    pub fn add( &mut self, source: impl Into<String> ) {
        self.add_track( Track::new( source ) );
    }


    /// Adds a prepared track to the end of the playlist.
    ///
    /// The new index is appended to the tail of the shuffle order even when
    /// shuffle is active; it is not mixed into the existing order.
    pub fn add_track( &mut self, track: Track ) {
        self.tracks.push( track );
        self.shuffle_order.push( self.tracks.len() - 1 );

        if self.current_index.is_none() {
            self.current_index = Some( 0 );
        }
    }


    /// Adds multiple tracks to the playlist.
    pub fn add_many<S: Into<String>>( &mut self, sources: impl IntoIterator<Item = S> ) {
        for source in sources {
            self.add( source );
        }
    }


    /// Adds every supported audio file found directly inside `dir`.
    ///
    /// @returns The number of tracks added
    pub fn load_from_directory( &mut self, dir: &Path ) -> Result<usize, LibraryError> {
        let files = library::scan_directory( dir )?;
        let count = files.len();

        self.add_many( files.into_iter().map( path_to_source ) );

        tracing::info!( "Loaded {} tracks from {:?}", count, dir );
        Ok( count )
    }


    /// Clears the playlist.
    pub fn clear( &mut self ) {
        self.tracks.clear();
        self.shuffle_order.clear();
        self.current_index = None;
    }


    /// Removes the track at the specified index.
    ///
    /// Out-of-range indices leave the playlist untouched. On success the
    /// shuffle order is rebuilt and the cursor clamped into range.
    pub fn remove( &mut self, index: usize ) -> Option<Track> {
        if index >= self.tracks.len() {
            return None;
        }

        let removed = self.tracks.remove( index );
        self.rebuild_shuffle_order();

        if let Some( current ) = self.current_index {
            if self.tracks.is_empty() {
                self.current_index = None;
            } else if current >= self.tracks.len() {
                self.current_index = Some( self.tracks.len() - 1 );
            }
        }

        Some( removed )
    }


    /// Gets the current track, resolved through the shuffle order when active.
    pub fn current( &self ) -> Option<&Track> {
        self.current_track_index().and_then( |i| self.tracks.get( i ) )
    }


    /// Gets the index into the track list the cursor currently resolves to.
    pub fn current_track_index( &self ) -> Option<usize> {
        let cursor = self.current_index?;
        if self.shuffle {
            self.shuffle_order.get( cursor ).copied()
        } else {
            Some( cursor )
        }
    }


    /// Advances the cursor, wrapping to the first position.
    ///
    /// Returns None only when the playlist is empty.
    pub fn next( &mut self ) -> Option<&Track> {
        if self.tracks.is_empty() {
            return None;
        }

        let len = self.tracks.len();
        let next = self.current_index.map_or( 0, |i| ( i + 1 ) % len );
        self.current_index = Some( next );
        self.current()
    }


    /// Moves the cursor back, wrapping to the last position.
    ///
    /// Returns None only when the playlist is empty.
    pub fn previous( &mut self ) -> Option<&Track> {
        if self.tracks.is_empty() {
            return None;
        }

        let len = self.tracks.len();
        let prev = self.current_index.map_or( 0, |i| ( i + len - 1 ) % len );
        self.current_index = Some( prev );
        self.current()
    }


    /// Jumps to a specific position.
    pub fn jump_to( &mut self, index: usize ) -> Option<&Track> {
        if index < self.tracks.len() {
            self.current_index = Some( index );
            self.current()
        } else {
            None
        }
    }


    /// Sets shuffle mode. Enabling always draws a fresh random order.
    pub fn set_shuffle( &mut self, shuffle: bool ) {
        self.shuffle = shuffle;
        if shuffle {
            self.reshuffle();
        }
    }


    /// Gets shuffle mode.
    pub fn shuffle( &self ) -> bool {
        self.shuffle
    }


    /// Regenerates the shuffle order from scratch and randomly permutes it.
    pub fn reshuffle( &mut self ) {
        self.shuffle_order = ( 0..self.tracks.len() ).collect();
        self.shuffle_order.shuffle( &mut self.rng );
    }


    /// Gets the shuffle order (indices into the track list).
    pub fn shuffle_order( &self ) -> &[usize] {
        &self.shuffle_order
    }


    /// Gets the track at a position in insertion order.
    pub fn track( &self, index: usize ) -> Option<&Track> {
        self.tracks.get( index )
    }


    /// Gets all tracks in insertion order.
    pub fn tracks( &self ) -> &[Track] {
        &self.tracks
    }


    /// Gets the number of tracks.
    pub fn len( &self ) -> usize {
        self.tracks.len()
    }


    /// Returns true if the playlist is empty.
    pub fn is_empty( &self ) -> bool {
        self.tracks.is_empty()
    }


    /// Gets the cursor position.
    pub fn current_index( &self ) -> Option<usize> {
        self.current_index
    }


    /// Returns true when the cursor sits on the last position (or the list is empty).
    pub fn is_at_end( &self ) -> bool {
        match self.current_index {
            Some( i ) => i + 1 >= self.tracks.len(),
            None => true,
        }
    }


    /// Returns true when the cursor sits on the first position (or the list is empty).
    pub fn is_at_beginning( &self ) -> bool {
        self.current_index.map_or( true, |i| i == 0 )
    }


    fn rebuild_shuffle_order( &mut self ) {
        if self.shuffle {
            self.reshuffle();
        } else {
            self.shuffle_order = ( 0..self.tracks.len() ).collect();
        }
    }
}


fn path_to_source( path: PathBuf ) -> String {
    path.to_string_lossy().into_owned()
}


#[cfg( test )]
mod tests {
    use super::*;


    fn playlist_of( names: &[&str] ) -> Playlist {
        let mut playlist = Playlist::with_seed( 7 );
        playlist.add_many( names.iter().copied() );
        playlist
    }


    fn is_permutation( order: &[usize], len: usize ) -> bool {
        let mut sorted = order.to_vec();
        sorted.sort_unstable();
        sorted == ( 0..len ).collect::<Vec<_>>()
    }


    #[test]
    fn test_title_derived_from_source() {
        assert_eq!( Track::new( "/music/Artist - Song.mp3" ).title(), "Artist - Song" );
        assert_eq!( Track::new( r"C:\music\intro.flac" ).title(), "intro" );
        assert_eq!( Track::new( "no_extension" ).title(), "no_extension" );
        assert_eq!( Track::new( "dir.v2/track.live.ogg" ).title(), "track.live" );
    }


    #[test]
    fn test_track_builders() {
        let track = Track::new( "a.mp3" )
            .with_title( "Alpha" )
            .with_artist( "Band" )
            .with_duration( Duration::from_secs( 200 ) );

        assert_eq!( track.title(), "Alpha" );
        assert_eq!( track.artist(), Some( "Band" ) );
        assert_eq!( track.duration(), Duration::from_secs( 200 ) );
        assert_eq!( Track::new( "b.mp3" ).duration(), Duration::ZERO );
    }


    #[test]
    fn test_first_add_sets_cursor() {
        let mut playlist = Playlist::new();
        assert_eq!( playlist.current_index(), None );
        assert!( playlist.current().is_none() );

        playlist.add( "a.mp3" );
        assert_eq!( playlist.current_index(), Some( 0 ) );

        playlist.add( "b.mp3" );
        assert_eq!( playlist.current_index(), Some( 0 ) );
        assert_eq!( playlist.current().map( Track::title ), Some( "a" ) );
    }


    #[test]
    fn test_shuffle_order_stays_a_permutation() {
        let mut playlist = Playlist::with_seed( 3 );
        for i in 0..20 {
            playlist.add( format!( "{}.mp3", i ) );
            assert!( is_permutation( playlist.shuffle_order(), playlist.len() ) );
            if i == 5 {
                playlist.set_shuffle( true );
            }
        }

        playlist.remove( 4 );
        assert!( is_permutation( playlist.shuffle_order(), playlist.len() ) );
    }


    #[test]
    fn test_add_while_shuffled_appends_to_order_tail() {
        let mut playlist = playlist_of( &[ "a", "b", "c", "d" ] );
        playlist.set_shuffle( true );
        let before = playlist.shuffle_order().to_vec();

        playlist.add( "e" );

        assert_eq!( &playlist.shuffle_order()[ ..4 ], before.as_slice() );
        assert_eq!( playlist.shuffle_order()[ 4 ], 4 );
    }


    #[test]
    fn test_next_previous_wraparound() {
        let mut playlist = playlist_of( &[ "a", "b", "c" ] );

        assert_eq!( playlist.next().map( Track::title ), Some( "b" ) );
        assert_eq!( playlist.next().map( Track::title ), Some( "c" ) );
        assert_eq!( playlist.next().map( Track::title ), Some( "a" ) );
        assert_eq!( playlist.previous().map( Track::title ), Some( "c" ) );
        assert_eq!( playlist.current_index(), Some( 2 ) );
    }


    #[test]
    fn test_next_then_previous_is_identity() {
        for len in 1..6 {
            let names: Vec<String> = ( 0..len ).map( |i| format!( "{}.mp3", i ) ).collect();
            let mut playlist = Playlist::with_seed( 1 );
            playlist.add_many( names );

            for start in 0..len {
                playlist.jump_to( start );
                playlist.next();
                playlist.previous();
                assert_eq!( playlist.current_index(), Some( start ) );
            }
        }
    }


    #[test]
    fn test_navigation_on_empty_playlist_fails() {
        let mut playlist = Playlist::new();
        assert!( playlist.next().is_none() );
        assert!( playlist.previous().is_none() );
        assert!( playlist.jump_to( 0 ).is_none() );
        assert_eq!( playlist.current_index(), None );
    }


    #[test]
    fn test_jump_to_out_of_range_leaves_cursor() {
        let mut playlist = playlist_of( &[ "a", "b", "c" ] );
        playlist.jump_to( 1 );

        assert!( playlist.jump_to( 3 ).is_none() );
        assert!( playlist.jump_to( 100 ).is_none() );
        assert_eq!( playlist.current_index(), Some( 1 ) );
    }


    #[test]
    fn test_remove_out_of_range_is_noop() {
        let mut playlist = playlist_of( &[ "a", "b", "c" ] );
        assert!( playlist.remove( 5 ).is_none() );
        assert_eq!( playlist.len(), 3 );
        assert_eq!( playlist.current_index(), Some( 0 ) );
    }


    #[test]
    fn test_remove_clamps_cursor() {
        let mut playlist = playlist_of( &[ "a", "b", "c" ] );
        playlist.jump_to( 2 );

        let removed = playlist.remove( 2 );
        assert_eq!( removed.map( |t| t.title().to_string() ), Some( "c".to_string() ) );
        assert_eq!( playlist.current_index(), Some( 1 ) );

        playlist.remove( 0 );
        playlist.remove( 0 );
        assert!( playlist.is_empty() );
        assert_eq!( playlist.current_index(), None );
        assert!( playlist.shuffle_order().is_empty() );
    }


    #[test]
    fn test_remove_before_cursor_keeps_position_value() {
        let mut playlist = playlist_of( &[ "a", "b", "c" ] );
        playlist.jump_to( 1 );
        playlist.remove( 0 );

        // Cursor stays in bounds, so it is not adjusted
        assert_eq!( playlist.current_index(), Some( 1 ) );
        assert_eq!( playlist.current().map( Track::title ), Some( "c" ) );
    }


    #[test]
    fn test_current_resolves_through_shuffle_order() {
        let mut playlist = playlist_of( &[ "a", "b", "c", "d", "e", "f" ] );
        playlist.set_shuffle( true );

        for cursor in 0..playlist.len() {
            playlist.jump_to( cursor );
            let expected = playlist.shuffle_order()[ cursor ];
            assert_eq!( playlist.current_track_index(), Some( expected ) );
            assert_eq!( playlist.current(), playlist.track( expected ) );
        }

        playlist.set_shuffle( false );
        playlist.jump_to( 3 );
        assert_eq!( playlist.current_track_index(), Some( 3 ) );
    }


    #[test]
    fn test_disable_shuffle_keeps_cursor() {
        let mut playlist = playlist_of( &[ "a", "b", "c" ] );
        playlist.set_shuffle( true );
        playlist.jump_to( 2 );
        playlist.set_shuffle( false );

        assert!( !playlist.shuffle() );
        assert_eq!( playlist.current_index(), Some( 2 ) );
    }


    #[test]
    fn test_end_and_beginning() {
        let mut playlist = Playlist::new();
        assert!( playlist.is_at_end() );
        assert!( playlist.is_at_beginning() );

        playlist.add_many( [ "a", "b" ] );
        assert!( playlist.is_at_beginning() );
        assert!( !playlist.is_at_end() );

        playlist.next();
        assert!( !playlist.is_at_beginning() );
        assert!( playlist.is_at_end() );
    }


    #[test]
    fn test_clear() {
        let mut playlist = playlist_of( &[ "a", "b" ] );
        playlist.set_shuffle( true );
        playlist.clear();

        assert!( playlist.is_empty() );
        assert!( playlist.shuffle_order().is_empty() );
        assert_eq!( playlist.current_index(), None );

        playlist.add( "c" );
        assert_eq!( playlist.current_index(), Some( 0 ) );
    }


    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        for name in [ "b.mp3", "a.FLAC", "notes.txt" ] {
            std::fs::write( dir.path().join( name ), b"" ).unwrap();
        }

        let mut playlist = Playlist::new();
        let added = playlist.load_from_directory( dir.path() ).unwrap();

        assert_eq!( added, 2 );
        let titles: Vec<_> = playlist.tracks().iter().map( Track::title ).collect();
        assert_eq!( titles, vec![ "a", "b" ] );
    }
}

//! Directory scanning
//!
//! Discovers playable audio files inside a directory.

use std::path::{ Path, PathBuf };

use thiserror::Error;


/// Supported audio file extensions.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp3", "wav", "ogg", "flac", "m4a", "wma",
];


/// Errors that can occur while scanning.
#[derive( Debug, Error )]
pub enum LibraryError {
    #[error( "IO error: {0}" )]
    Io( #[from] std::io::Error ),

    #[error( "Path not found: {0}" )]
    NotFound( PathBuf ),

    #[error( "Not a directory: {0}" )]
    NotADirectory( PathBuf ),
}


/// Lists the supported audio files directly inside `dir`.
///
/// Subdirectories are not descended into. Entries that cannot be read are
/// skipped. Results are sorted by path so repeated scans agree.
pub fn scan_directory( dir: &Path ) -> Result<Vec<PathBuf>, LibraryError> {
    let entries = match std::fs::read_dir( dir ) {
        Ok( e ) => e,
        Err( e ) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err( LibraryError::NotFound( dir.to_path_buf() ) );
        }
        Err( _ ) if dir.is_file() => {
            return Err( LibraryError::NotADirectory( dir.to_path_buf() ) );
        }
        Err( e ) => return Err( LibraryError::Io( e ) ),
    };

    let mut files = Vec::new();
    for entry in entries.flatten() {
        let is_file = entry.file_type().map( |t| t.is_file() ).unwrap_or( false );
        let path = entry.path();

        if is_file && is_audio_file( &path ) {
            files.push( path );
        } else {
            tracing::trace!( "Skipping {:?}", path );
        }
    }

    files.sort();
    tracing::debug!( "Found {} audio files in {:?}", files.len(), dir );
    Ok( files )
}


/// Checks if a file has a supported audio extension (case-insensitive).
pub fn is_audio_file( path: &Path ) -> bool {
    path.extension()
        .and_then( |e| e.to_str() )
        .map( |e| SUPPORTED_EXTENSIONS.contains( &e.to_lowercase().as_str() ) )
        .unwrap_or( false )
}


#[cfg( test )]
mod tests {
    use super::*;

    use std::fs;


    #[test]
    fn test_is_audio_file() {
        assert!( is_audio_file( Path::new( "song.mp3" ) ) );
        assert!( is_audio_file( Path::new( "SONG.WMA" ) ) );
        assert!( is_audio_file( Path::new( "/a/b/c.M4a" ) ) );
        assert!( !is_audio_file( Path::new( "cover.jpg" ) ) );
        assert!( !is_audio_file( Path::new( "mp3" ) ) );
        assert!( !is_audio_file( Path::new( "track.opus" ) ) );
    }


    #[test]
    fn test_scan_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in [ "c.ogg", "a.mp3", "b.Wav", "readme.md", "x.flac.bak" ] {
            fs::write( dir.path().join( name ), b"" ).unwrap();
        }

        let files = scan_directory( dir.path() ).unwrap();
        let names: Vec<_> = files
            .iter()
            .filter_map( |p| p.file_name().and_then( |n| n.to_str() ) )
            .collect();

        assert_eq!( names, vec![ "a.mp3", "b.Wav", "c.ogg" ] );
    }


    #[test]
    fn test_scan_is_not_recursive() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join( "album.mp3" );
        fs::create_dir( &nested ).unwrap();
        fs::write( nested.join( "inner.mp3" ), b"" ).unwrap();
        fs::write( dir.path().join( "top.flac" ), b"" ).unwrap();

        let files = scan_directory( dir.path() ).unwrap();
        assert_eq!( files, vec![ dir.path().join( "top.flac" ) ] );
    }


    #[test]
    fn test_scan_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join( "nope" );

        let result = scan_directory( &missing );
        assert!( matches!( result, Err( LibraryError::NotFound( _ ) ) ) );
    }


    #[test]
    fn test_scan_file_instead_of_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join( "song.mp3" );
        fs::write( &file, b"" ).unwrap();

        let result = scan_directory( &file );
        assert!( matches!( result, Err( LibraryError::NotADirectory( _ ) ) ) );
    }
}

//! Cadence CLI - Line-oriented terminal music player

mod cli;
mod repl;
mod settings;

use std::fs::{ self, OpenOptions };
use std::sync::Mutex;

use anyhow::{ Context, Result };
use cadence_core::{ DeviceBackend, Playlist, TransportController };
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Args;
use settings::Settings;


/// Environment variable that overrides the log filter.
const LOG_ENV: &str = "CADENCE_LOG";


fn main() -> Result<()> {
    let args = Args::parse();

    let settings = match Settings::load( args.settings.as_deref() ) {
        Ok( settings ) => settings,
        Err( e ) => {
            eprintln!( "Warning: {:#}; using default settings", e );
            Settings::default()
        }
    };

    if let Err( e ) = init_logging( &settings.log_level ) {
        eprintln!( "Warning: logging disabled: {:#}", e );
    }

    tracing::info!( "Cadence {} starting", env!( "CARGO_PKG_VERSION" ) );

    let mut controller = TransportController::with_options(
        DeviceBackend::new(),
        Playlist::new(),
        settings.transport_options(),
    );
    controller.set_volume( args.volume.unwrap_or( settings.volume ) );
    if let Some( mode ) = args.loop_mode {
        controller.set_loop_mode( mode );
    }

    println!( "=== Cadence ===" );
    println!( "Type 'help' for available commands." );

    for path in &args.files {
        if path.is_dir() {
            match controller.load_directory( path ) {
                Ok( count ) => println!( "Loaded {} tracks from {}", count, path.display() ),
                Err( e ) => println!( "Error: {}", e ),
            }
        } else {
            controller.add_track( path.to_string_lossy().into_owned() );
            println!( "Added: {}", path.display() );
        }
    }

    if args.shuffle {
        controller.playlist_mut().set_shuffle( true );
    }

    if !controller.playlist().is_empty() {
        match controller.play_current_track() {
            Ok(()) => {
                if let Some( track ) = controller.playlist().current() {
                    println!( "Now playing: {}", track.title() );
                }
            }
            Err( e ) => println!( "Error: {}", e ),
        }
    }

    repl::run( &mut controller, settings.poll_interval() )?;

    tracing::info!( "Cadence exiting" );
    Ok(())
}


/// Sends tracing output to a log file so it never mixes with the prompt.
///
/// The filter comes from `CADENCE_LOG` when set, otherwise `default_level`.
fn init_logging( default_level: &str ) -> Result<()> {
    let dir = dirs::data_local_dir()
        .context( "No local data directory" )?
        .join( "cadence" );
    fs::create_dir_all( &dir )
        .with_context( || format!( "Failed to create {}", dir.display() ) )?;

    let log_path = dir.join( "cadence.log" );
    let file = OpenOptions::new()
        .create( true )
        .append( true )
        .open( &log_path )
        .with_context( || format!( "Failed to open {}", log_path.display() ) )?;

    let filter = EnvFilter::try_from_env( LOG_ENV )
        .unwrap_or_else( |_| EnvFilter::new( default_level ) );

    tracing_subscriber::fmt()
        .with_env_filter( filter )
        .with_writer( Mutex::new( file ) )
        .with_ansi( false )
        .try_init()
        .map_err( |e| anyhow::anyhow!( "{}", e ) )?;

    Ok(())
}

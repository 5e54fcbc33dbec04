//! Native audio backend
//!
//! Plays files on the default output device. Each active stream owns a
//! decode thread that feeds a [`SampleQueue`]; the device callback drains it.
//! The decode thread only raises a flag at end of file; the transition to
//! Stopped and the end callback happen in [`AudioBackend::poll`].

use std::path::{ Path, PathBuf };
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rubato::{ FastFixedOut, PolynomialDegree, Resampler };

use crate::backend::{ clamp_volume, AudioBackend, BackendError, EndCallback, PlaybackState };
use crate::decoder::Decoder;
use crate::output::{ AudioOutput, SampleQueue };


/// Output frames per resampler chunk.
const RESAMPLE_CHUNK: usize = 1024;

/// Volume used until the user changes it.
pub const DEFAULT_VOLUME: f32 = 50.0;


/// One running output stream and its decode thread.
struct Stream {
    stop_flag: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    queue: Arc<SampleQueue>,
    // Dropping the output closes the device stream
    output: AudioOutput,
    thread: Option<thread::JoinHandle<()>>,
    /// Track position the stream started from
    start: Duration,
}


impl Stream {
    fn position( &self ) -> Duration {
        let rate = self.output.sample_rate().max( 1 );
        self.start + Duration::from_secs_f64( self.queue.frames_played() as f64 / rate as f64 )
    }


    fn shutdown( mut self ) {
        self.stop_flag.store( true, Ordering::Relaxed );
        self.queue.clear();
        if let Some( thread ) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!( "Decode thread panicked" );
            }
        }
    }
}


/// [`AudioBackend`] backed by symphonia for decoding and cpal for output.
pub struct DeviceBackend {
    state: PlaybackState,
    loaded: Option<PathBuf>,
    /// Decoder opened by `load`, reused by the first `play`
    prepared: Option<Decoder>,
    duration: Duration,
    /// Where the next stream starts when stopped
    start_offset: Duration,
    stream: Option<Stream>,
    volume: f32,
    on_end: Option<EndCallback>,
}


impl Default for DeviceBackend {
    fn default() -> Self {
        Self::new()
    }
}


impl DeviceBackend {
    pub fn new() -> Self {
        Self {
            state: PlaybackState::Stopped,
            loaded: None,
            prepared: None,
            duration: Duration::ZERO,
            start_offset: Duration::ZERO,
            stream: None,
            volume: DEFAULT_VOLUME,
            on_end: None,
        }
    }


    fn open_decoder( path: &Path ) -> Result<Decoder, BackendError> {
        Decoder::open( path ).map_err( |e| BackendError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }


    /// Opens the device and spawns the decode thread at `start`.
    fn start_stream(
        &mut self,
        mut decoder: Decoder,
        start: Duration,
        paused: bool,
    ) -> Result<(), BackendError> {
        if !start.is_zero() {
            decoder.seek( start ).map_err( |e| BackendError::Seek( e.to_string() ) )?;
        }

        let source_rate = decoder.sample_rate();
        let channels = decoder.channels();

        let ( output, queue ) = AudioOutput::open( source_rate, channels )
            .map_err( |e| BackendError::Output( e.to_string() ) )?;
        queue.set_gain( self.volume / 100.0 );
        queue.set_paused( paused );

        let target_rate = output.sample_rate();
        let resampler = if source_rate != target_rate {
            tracing::info!( "Resampling: {} Hz -> {} Hz", source_rate, target_rate );
            let resampler = FastFixedOut::<f32>::new(
                target_rate as f64 / source_rate as f64,
                2.0,
                PolynomialDegree::Cubic,
                RESAMPLE_CHUNK,
                channels,
            ).map_err( |e| BackendError::Output( format!( "Failed to create resampler: {}", e ) ) )?;
            Some( resampler )
        } else {
            None
        };

        output.play().map_err( |e| BackendError::Output( e.to_string() ) )?;

        let stop_flag = Arc::new( AtomicBool::new( false ) );
        let finished = Arc::new( AtomicBool::new( false ) );

        let worker = DecodeWorker {
            decoder,
            resampler,
            queue: Arc::clone( &queue ),
            stop_flag: Arc::clone( &stop_flag ),
            finished: Arc::clone( &finished ),
        };
        let thread = thread::Builder::new()
            .name( "cadence-decode".into() )
            .spawn( move || worker.run() )
            .map_err( |e| BackendError::Output( format!( "Failed to spawn decode thread: {}", e ) ) )?;

        self.stream = Some( Stream {
            stop_flag,
            finished,
            queue,
            output,
            thread: Some( thread ),
            start,
        });
        Ok(())
    }


    fn teardown_stream( &mut self ) {
        if let Some( stream ) = self.stream.take() {
            stream.shutdown();
        }
    }
}


impl AudioBackend for DeviceBackend {
    fn load( &mut self, path: &Path ) -> Result<(), BackendError> {
        self.stop();
        self.loaded = None;
        self.prepared = None;
        self.duration = Duration::ZERO;

        let decoder = Self::open_decoder( path )?;
        self.duration = decoder.duration().unwrap_or( Duration::ZERO );
        self.prepared = Some( decoder );
        self.loaded = Some( path.to_path_buf() );

        tracing::info!( "Loaded {:?} ({:?})", path, self.duration );
        Ok(())
    }


    fn play( &mut self ) -> Result<(), BackendError> {
        match self.state {
            PlaybackState::Playing => Ok(()),
            PlaybackState::Paused => {
                if let Some( stream ) = &self.stream {
                    stream.queue.set_paused( false );
                }
                self.state = PlaybackState::Playing;
                tracing::info!( "Resumed" );
                Ok(())
            }
            PlaybackState::Stopped => {
                let path = self.loaded.clone().ok_or( BackendError::NoTrack )?;
                let decoder = match self.prepared.take() {
                    Some( decoder ) => decoder,
                    None => Self::open_decoder( &path )?,
                };

                self.start_stream( decoder, self.start_offset, false )?;
                self.state = PlaybackState::Playing;
                Ok(())
            }
        }
    }


    fn pause( &mut self ) {
        if self.state != PlaybackState::Playing {
            return;
        }
        if let Some( stream ) = &self.stream {
            stream.queue.set_paused( true );
        }
        self.state = PlaybackState::Paused;
        tracing::info!( "Paused" );
    }


    fn stop( &mut self ) {
        if self.stream.is_some() {
            self.teardown_stream();
            tracing::info!( "Stopped" );
        }
        self.state = PlaybackState::Stopped;
        self.start_offset = Duration::ZERO;
    }


    fn seek( &mut self, position: Duration ) -> Result<(), BackendError> {
        let path = self.loaded.clone().ok_or( BackendError::NoTrack )?;

        if self.state == PlaybackState::Stopped {
            self.start_offset = position;
            return Ok(());
        }

        // Restart the stream at the new position, keeping the pause state
        let paused = self.state == PlaybackState::Paused;
        self.teardown_stream();

        let result = Self::open_decoder( &path )
            .and_then( |decoder| self.start_stream( decoder, position, paused ) );
        if let Err( e ) = result {
            self.state = PlaybackState::Stopped;
            self.start_offset = Duration::ZERO;
            return Err( e );
        }

        tracing::debug!( "Seeked to {:?}", position );
        Ok(())
    }


    fn position( &self ) -> Duration {
        match &self.stream {
            Some( stream ) if self.duration.is_zero() => stream.position(),
            Some( stream ) => stream.position().min( self.duration ),
            None => self.start_offset,
        }
    }


    fn duration( &self ) -> Duration {
        self.duration
    }


    fn set_volume( &mut self, volume: f32 ) {
        self.volume = clamp_volume( volume );
        if let Some( stream ) = &self.stream {
            stream.queue.set_gain( self.volume / 100.0 );
        }
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
        let ended = self.state == PlaybackState::Playing
            && self.stream.as_ref().is_some_and( |s| s.finished.load( Ordering::Relaxed ) );
        if !ended {
            return;
        }

        tracing::debug!( "End of track detected" );
        self.teardown_stream();
        self.state = PlaybackState::Stopped;
        self.start_offset = Duration::ZERO;

        if let Some( callback ) = self.on_end.as_mut() {
            callback();
        }
    }
}


impl Drop for DeviceBackend {
    fn drop( &mut self ) {
        self.teardown_stream();
    }
}


/// State moved onto the decode thread.
struct DecodeWorker {
    decoder: Decoder,
    resampler: Option<FastFixedOut<f32>>,
    queue: Arc<SampleQueue>,
    stop_flag: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}


impl DecodeWorker {
    fn stopped( &self ) -> bool {
        self.stop_flag.load( Ordering::Relaxed )
    }


    fn run( mut self ) {
        let channels = self.decoder.channels();
        // Planar input waiting for the resampler
        let mut pending: Vec<Vec<f32>> = ( 0..channels ).map( |_| Vec::new() ).collect();
        // Keep roughly 50ms decoded ahead
        let low_water = ( self.decoder.sample_rate() as usize * channels ) / 20;

        loop {
            if self.stopped() {
                tracing::debug!( "Decode thread: stop requested" );
                return;
            }

            if self.queue.is_paused() {
                thread::sleep( Duration::from_millis( 10 ) );
                continue;
            }

            if self.queue.len() > low_water {
                thread::sleep( Duration::from_millis( 5 ) );
                continue;
            }

            match self.decoder.decode_next() {
                Ok( Some( samples ) ) => {
                    let out = self.resample( &samples, &mut pending, channels );
                    self.push_all( &out );
                }
                Ok( None ) => break,
                Err( e ) => {
                    // Treat an unreadable tail as the end of the track
                    tracing::warn!( "Decode error: {}", e );
                    break;
                }
            }
        }

        if let Some( resampler ) = self.resampler.as_mut() {
            if pending.first().is_some_and( |ch| !ch.is_empty() ) {
                match resampler.process_partial( Some( &pending ), None ) {
                    Ok( planar ) => {
                        let out = interleave( &planar );
                        self.push_all( &out );
                    }
                    Err( e ) => tracing::warn!( "Final resample error: {}", e ),
                }
            }
        }

        while !self.queue.is_empty() && !self.stopped() {
            thread::sleep( Duration::from_millis( 10 ) );
        }

        if !self.stopped() {
            tracing::debug!( "Decode thread: end of file" );
            self.finished.store( true, Ordering::Relaxed );
        }
    }


    /// Runs interleaved samples through the resampler, if any.
    fn resample( &mut self, samples: &[f32], pending: &mut [Vec<f32>], channels: usize ) -> Vec<f32> {
        let Some( resampler ) = self.resampler.as_mut() else {
            return samples.to_vec();
        };

        for frame in samples.chunks( channels ) {
            for ( ch, sample ) in frame.iter().enumerate() {
                pending[ ch ].push( *sample );
            }
        }

        let mut out = Vec::new();
        while pending[ 0 ].len() >= resampler.input_frames_next() {
            let needed = resampler.input_frames_next();
            let chunk: Vec<Vec<f32>> = pending
                .iter_mut()
                .map( |ch| ch.drain( ..needed ).collect() )
                .collect();

            match resampler.process( &chunk, None ) {
                Ok( planar ) => out.extend( interleave( &planar ) ),
                Err( e ) => {
                    tracing::warn!( "Resample error: {}", e );
                    break;
                }
            }
        }
        out
    }


    /// Pushes everything into the queue, waiting while it is full.
    fn push_all( &self, samples: &[f32] ) {
        let mut offset = 0;
        while offset < samples.len() && !self.stopped() {
            let pushed = self.queue.push( &samples[ offset.. ] );
            offset += pushed;
            if pushed == 0 {
                thread::sleep( Duration::from_millis( 5 ) );
            }
        }
    }
}


/// Converts planar channels to interleaved samples.
fn interleave( channels: &[Vec<f32>] ) -> Vec<f32> {
    let frames = channels.first().map_or( 0, Vec::len );
    let mut out = Vec::with_capacity( frames * channels.len() );
    for f in 0..frames {
        for ch in channels {
            out.push( ch[ f ] );
        }
    }
    out
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_interleave() {
        let planar = vec![ vec![ 1.0, 2.0 ], vec![ -1.0, -2.0 ] ];
        assert_eq!( interleave( &planar ), vec![ 1.0, -1.0, 2.0, -2.0 ] );
        assert!( interleave( &[] ).is_empty() );
    }


    #[test]
    fn test_new_backend_is_stopped() {
        let backend = DeviceBackend::new();
        assert_eq!( backend.state(), PlaybackState::Stopped );
        assert_eq!( backend.volume(), DEFAULT_VOLUME );
        assert_eq!( backend.position(), Duration::ZERO );
        assert!( backend.current_file().is_none() );
    }


    #[test]
    fn test_play_without_track_fails() {
        let mut backend = DeviceBackend::new();
        assert!( matches!( backend.play(), Err( BackendError::NoTrack ) ) );
        assert!( matches!( backend.seek( Duration::from_secs( 1 ) ), Err( BackendError::NoTrack ) ) );
        assert_eq!( backend.state(), PlaybackState::Stopped );
    }


    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join( "missing.mp3" );

        let mut backend = DeviceBackend::new();
        let result = backend.load( &missing );

        assert!( matches!( result, Err( BackendError::Load { .. } ) ) );
        assert!( backend.current_file().is_none() );
        assert_eq!( backend.state(), PlaybackState::Stopped );
    }


    #[test]
    fn test_load_garbage_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join( "bogus.mp3" );
        std::fs::write( &bogus, b"definitely not audio" ).unwrap();

        let mut backend = DeviceBackend::new();
        assert!( backend.load( &bogus ).is_err() );
        assert_eq!( backend.duration(), Duration::ZERO );
    }


    #[test]
    fn test_volume_clamped() {
        let mut backend = DeviceBackend::new();
        backend.set_volume( 120.0 );
        assert_eq!( backend.volume(), 100.0 );
        backend.set_volume( -3.0 );
        assert_eq!( backend.volume(), 0.0 );
    }


    #[test]
    fn test_poll_while_stopped_does_not_fire() {
        let fired = Arc::new( AtomicBool::new( false ) );
        let flag = Arc::clone( &fired );

        let mut backend = DeviceBackend::new();
        backend.set_on_end( Box::new( move || flag.store( true, Ordering::SeqCst ) ) );
        backend.poll();

        assert!( !fired.load( Ordering::SeqCst ) );
    }
}

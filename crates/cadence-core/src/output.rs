//! Audio output via cpal
//!
//! Sends decoded PCM samples to the default output device.

use std::collections::VecDeque;
use std::sync::atomic::{ AtomicBool, AtomicU32, AtomicU64, Ordering };
use std::sync::{ Arc, Mutex, MutexGuard, PoisonError };

use cpal::traits::{ DeviceTrait, HostTrait, StreamTrait };
use thiserror::Error;


/// Errors that can occur with audio output.
#[derive( Debug, Error )]
pub enum OutputError {
    #[error( "No output device available" )]
    NoDevice,

    #[error( "Failed to get stream config: {0}" )]
    StreamConfig( String ),

    #[error( "Failed to build output stream: {0}" )]
    BuildStream( String ),

    #[error( "Failed to play stream: {0}" )]
    PlayStream( String ),
}


/// Bounded queue between the decode thread and the device callback.
///
/// Samples are stored interleaved with the source channel count and
/// remixed to the device channel count on the way out.
pub struct SampleQueue {
    buffer: Mutex<VecDeque<f32>>,
    capacity: usize,
    paused: AtomicBool,
    /// Gain stored as f32 bits (0.0 to 1.0)
    gain: AtomicU32,
    /// Device frames written out since the stream started
    frames_played: AtomicU64,
    source_channels: usize,
    output_channels: usize,
}


impl SampleQueue {
    pub fn new( capacity: usize, source_channels: usize, output_channels: usize ) -> Self {
        Self {
            buffer: Mutex::new( VecDeque::with_capacity( capacity ) ),
            capacity,
            paused: AtomicBool::new( false ),
            gain: AtomicU32::new( 1.0_f32.to_bits() ),
            frames_played: AtomicU64::new( 0 ),
            source_channels: source_channels.max( 1 ),
            output_channels: output_channels.max( 1 ),
        }
    }


    fn lock( &self ) -> MutexGuard<'_, VecDeque<f32>> {
        self.buffer.lock().unwrap_or_else( PoisonError::into_inner )
    }


    /// Pushes samples. Returns how many were accepted.
    pub fn push( &self, samples: &[f32] ) -> usize {
        let mut buf = self.lock();
        let available = self.capacity.saturating_sub( buf.len() );
        let to_push = samples.len().min( available );
        buf.extend( samples[ ..to_push ].iter().copied() );
        to_push
    }


    /// Fills `output` for the device, padding with silence when starved or paused.
    pub fn pop( &self, output: &mut [f32] ) {
        output.fill( 0.0 );
        if self.paused.load( Ordering::Relaxed ) {
            return;
        }

        let gain = f32::from_bits( self.gain.load( Ordering::Relaxed ) );
        let src_ch = self.source_channels;
        let out_ch = self.output_channels;

        let mut buf = self.lock();
        let frames = ( output.len() / out_ch ).min( buf.len() / src_ch );

        let mut frame = Vec::with_capacity( src_ch );
        for out_frame in output.chunks_exact_mut( out_ch ).take( frames ) {
            frame.clear();
            frame.extend( buf.drain( ..src_ch ) );

            if src_ch == 2 && out_ch == 1 {
                out_frame[ 0 ] = ( frame[ 0 ] + frame[ 1 ] ) * 0.5 * gain;
                continue;
            }

            // Copy matching channels, repeat the last source channel for the rest
            for ( ch, sample ) in out_frame.iter_mut().enumerate() {
                *sample = frame[ ch.min( src_ch - 1 ) ] * gain;
            }
        }

        self.frames_played.fetch_add( frames as u64, Ordering::Relaxed );
    }


    pub fn len( &self ) -> usize {
        self.lock().len()
    }


    pub fn is_empty( &self ) -> bool {
        self.lock().is_empty()
    }


    pub fn clear( &self ) {
        self.lock().clear();
    }


    pub fn set_paused( &self, paused: bool ) {
        self.paused.store( paused, Ordering::Relaxed );
    }


    pub fn is_paused( &self ) -> bool {
        self.paused.load( Ordering::Relaxed )
    }


    /// Sets the linear gain (0.0 = mute, 1.0 = unchanged).
    pub fn set_gain( &self, gain: f32 ) {
        self.gain.store( gain.to_bits(), Ordering::Relaxed );
    }


    /// Device frames consumed so far.
    pub fn frames_played( &self ) -> u64 {
        self.frames_played.load( Ordering::Relaxed )
    }
}


/// Open output stream on the default device.
/// Note: This struct is NOT Send/Sync due to cpal::Stream.
pub struct AudioOutput {
    stream: cpal::Stream,
    sample_rate: u32,
}


impl AudioOutput {
    /// Opens the default device, preferring a config that matches the source.
    ///
    /// Returns the output and the queue the decoder should fill.
    pub fn open(
        source_sample_rate: u32,
        source_channels: usize,
    ) -> Result<( Self, Arc<SampleQueue> ), OutputError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or( OutputError::NoDevice )?;

        tracing::debug!( "Using output device: {:?}", device.name() );

        let supported: Vec<_> = device
            .supported_output_configs()
            .map_err( |e| OutputError::StreamConfig( e.to_string() ) )?
            .collect();

        let supports_rate = |c: &cpal::SupportedStreamConfigRange| {
            c.min_sample_rate().0 <= source_sample_rate && c.max_sample_rate().0 >= source_sample_rate
        };

        let config = match supported
            .iter()
            .find( |c| supports_rate( *c ) && c.channels() as usize == source_channels )
            .or_else( || supported.iter().find( |c| supports_rate( *c ) ) )
        {
            Some( range ) => range.clone()
                .with_sample_rate( cpal::SampleRate( source_sample_rate ) )
                .config(),
            None => {
                // Device can't run at the file's rate; the caller resamples
                device
                    .default_output_config()
                    .map_err( |e| OutputError::StreamConfig( e.to_string() ) )?
                    .config()
            }
        };

        tracing::debug!(
            "Output config: {} Hz, {} channels",
            config.sample_rate.0,
            config.channels
        );

        // About half a second of audio at the device rate
        let capacity = ( config.sample_rate.0 as usize ) * source_channels / 2;
        let queue = Arc::new( SampleQueue::new( capacity, source_channels, config.channels as usize ) );
        let callback_queue = Arc::clone( &queue );

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    callback_queue.pop( data );
                },
                |err| {
                    tracing::error!( "Audio output error: {}", err );
                },
                None,
            )
            .map_err( |e| OutputError::BuildStream( e.to_string() ) )?;

        Ok((
            Self {
                stream,
                sample_rate: config.sample_rate.0,
            },
            queue,
        ))
    }


    pub fn play( &self ) -> Result<(), OutputError> {
        self.stream
            .play()
            .map_err( |e| OutputError::PlayStream( e.to_string() ) )
    }


    /// Sample rate the device actually runs at.
    pub fn sample_rate( &self ) -> u32 {
        self.sample_rate
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_push_respects_capacity() {
        let queue = SampleQueue::new( 4, 2, 2 );
        assert_eq!( queue.push( &[ 0.1; 6 ] ), 4 );
        assert_eq!( queue.len(), 4 );
        assert_eq!( queue.push( &[ 0.1 ] ), 0 );
    }


    #[test]
    fn test_pop_counts_frames_and_pads_silence() {
        let queue = SampleQueue::new( 16, 2, 2 );
        queue.push( &[ 0.5, -0.5, 0.25, -0.25 ] );

        let mut out = [ 1.0; 6 ];
        queue.pop( &mut out );

        assert_eq!( out, [ 0.5, -0.5, 0.25, -0.25, 0.0, 0.0 ] );
        assert_eq!( queue.frames_played(), 2 );
        assert!( queue.is_empty() );
    }


    #[test]
    fn test_pop_mono_to_stereo() {
        let queue = SampleQueue::new( 16, 1, 2 );
        queue.push( &[ 0.3, 0.6 ] );

        let mut out = [ 0.0; 4 ];
        queue.pop( &mut out );

        assert_eq!( out, [ 0.3, 0.3, 0.6, 0.6 ] );
    }


    #[test]
    fn test_pop_stereo_to_mono() {
        let queue = SampleQueue::new( 16, 2, 1 );
        queue.push( &[ 0.2, 0.4 ] );

        let mut out = [ 0.0; 1 ];
        queue.pop( &mut out );

        assert!( ( out[ 0 ] - 0.3 ).abs() < 1e-6 );
    }


    #[test]
    fn test_paused_outputs_silence() {
        let queue = SampleQueue::new( 16, 1, 1 );
        queue.push( &[ 0.9, 0.9 ] );
        queue.set_paused( true );

        let mut out = [ 1.0; 2 ];
        queue.pop( &mut out );

        assert_eq!( out, [ 0.0, 0.0 ] );
        assert_eq!( queue.len(), 2 );
        assert_eq!( queue.frames_played(), 0 );
    }


    #[test]
    fn test_gain_applied() {
        let queue = SampleQueue::new( 16, 1, 1 );
        queue.set_gain( 0.5 );
        queue.push( &[ 0.8 ] );

        let mut out = [ 0.0; 1 ];
        queue.pop( &mut out );

        assert!( ( out[ 0 ] - 0.4 ).abs() < 1e-6 );
    }
}

/// Pitch tables, shaping curves and noise buffers used by the instruments
use std::sync::Arc;

use rand::Rng;

/// Chord roots for keys, one per beat of the bar.
pub const CHORD_ROOTS: [f32; 4] = [55.0, 65.41, 73.42, 82.41];
/// Scale the bass walks through, one note per beat.
pub const BASS_NOTES: [f32; 6] = [55.0, 65.41, 73.42, 82.41, 92.5, 110.0];
/// Semitone offsets of a minor-seventh chord.
pub const MINOR_SEVENTH: [f32; 4] = [0.0, 3.0, 7.0, 10.0];
pub const CHORD_NOTES: usize = MINOR_SEVENTH.len();

pub fn chord_root(step: usize) -> f32 {
    CHORD_ROOTS[(step / 4) % CHORD_ROOTS.len()]
}

pub fn bass_note(step: usize) -> f32 {
    BASS_NOTES[(step / 4) % BASS_NOTES.len()]
}

pub fn transpose(root_hz: f32, semitones: f32) -> f32 {
    root_hz * 2.0_f32.powf(semitones / 12.0)
}

pub fn minor7(root_hz: f32) -> [f32; CHORD_NOTES] {
    MINOR_SEVENTH.map(|semitones| transpose(root_hz, semitones))
}

/// Soft-clipping transfer curve; larger `amount` means more drive.
pub fn distortion_curve(amount: f32) -> Arc<[f32]> {
    const LEN: usize = 44_100;
    let deg = std::f32::consts::PI / 180.0;
    (0..LEN)
        .map(|i| {
            let x = (i as f32 * 2.0) / LEN as f32 - 1.0;
            ((3.0 + amount) * x * 20.0 * deg) / (std::f32::consts::PI + amount * x.abs())
        })
        .collect()
}

/// Buffer of independent uniform samples in [-1, 1].
pub fn white_noise<R: Rng + ?Sized>(rng: &mut R, len: usize) -> Arc<[f32]> {
    (0..len).map(|_| rng.gen_range(-1.0..=1.0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn chord_is_minor_seventh() {
        let chord = minor7(110.0);
        assert_eq!(chord[0], 110.0);
        assert!((chord[1] - 130.81).abs() < 0.01);
        assert!((chord[2] - 164.81).abs() < 0.01);
        assert!((chord[3] - 196.0).abs() < 0.01);
    }

    #[test]
    fn roots_follow_the_beat() {
        assert_eq!(chord_root(0), 55.0);
        assert_eq!(chord_root(3), 55.0);
        assert_eq!(chord_root(4), 65.41);
        assert_eq!(chord_root(15), 82.41);
        assert_eq!(bass_note(8), 73.42);
        assert_eq!(bass_note(12), 82.41);
    }

    #[test]
    fn noise_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let noise = white_noise(&mut rng, 4096);
        assert_eq!(noise.len(), 4096);
        assert!(noise.iter().all(|s| (-1.0..=1.0).contains(s)));
        assert!(noise.iter().any(|s| *s < 0.0) && noise.iter().any(|s| *s > 0.0));
    }

    #[test]
    fn curve_is_odd_and_bounded() {
        let curve = distortion_curve(5.0);
        assert!(curve[0] < 0.0);
        assert!(curve[curve.len() - 1] > 0.0);
        assert!(curve.iter().all(|s| s.abs() <= 1.0));
    }
}

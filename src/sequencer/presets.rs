/// Built-in pattern generators
use rand::{Rng, RngCore};

use super::{Pattern, STEPS};

pub const DEFAULT_DENSITY: f32 = 0.35;

const ELECTRO: &[(&str, &[usize])] = &[
    ("kick", &[0, 4, 8, 12]),
    ("snare", &[4, 12]),
    ("hat", &[0, 2, 4, 6, 8, 10, 12, 14]),
    ("clap", &[12]),
    ("shaker", &[1, 3, 5, 7, 9, 11, 13, 15]),
    ("rim", &[10]),
    ("tomL", &[11]),
    ("tomM", &[15]),
    ("ride", &[0, 8]),
    ("crash", &[0]),
    ("keys", &[0, 8, 12]),
    ("bass", &[0, 8]),
];

/// Four-on-the-floor groove over the rows of `template`. Rows the preset
/// does not know stay empty.
pub fn electro(template: &Pattern) -> Pattern {
    let mut pattern = template.clone();
    pattern.clear();
    for (id, steps) in ELECTRO {
        for &step in *steps {
            // rows missing from the template are skipped
            let _ = pattern.set(id, step, true);
        }
    }
    pattern
}

/// Each cell on with probability `density`; hats and shakers run a little busier.
pub fn random(template: &Pattern, density: f32, rng: &mut dyn RngCore) -> Pattern {
    let density = density.clamp(0.0, 1.0);
    let mut pattern = template.clone();
    let ids: Vec<String> = template.track_ids().map(str::to_string).collect();
    for id in ids {
        let boost = if id == "hat" || id == "shaker" { 1.2 } else { 1.0 };
        for step in 0..STEPS {
            let on = rng.gen::<f32>() < density * boost;
            let _ = pattern.set(&id, step, on);
        }
    }
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::default_tracks;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn template() -> Pattern {
        let tracks = default_tracks();
        Pattern::empty(tracks.iter().map(|t| t.id.as_str()))
    }

    #[test]
    fn electro_places_four_kicks() {
        let pattern = electro(&template());
        let kicks: Vec<usize> = (0..STEPS).filter(|s| pattern.get("kick", *s)).collect();
        assert_eq!(kicks, vec![0, 4, 8, 12]);
        assert!(pattern.row("tomH").unwrap().iter().all(|c| !c));
    }

    #[test]
    fn random_respects_density_extremes() {
        let mut rng = StdRng::seed_from_u64(9);
        assert_eq!(random(&template(), 0.0, &mut rng).active_count(), 0);
        assert_eq!(random(&template(), 1.0, &mut rng).active_count(), 13 * STEPS);
    }

    #[test]
    fn random_keeps_row_set() {
        let mut rng = StdRng::seed_from_u64(10);
        let base = template();
        let pattern = random(&base, DEFAULT_DENSITY, &mut rng);
        assert!(pattern.track_ids().eq(base.track_ids()));
    }
}

#[cfg(feature = "gui")]
use std::path::{Path, PathBuf};
#[cfg(feature = "gui")]
use std::time::{Duration, Instant};

#[cfg(feature = "gui")]
use eframe::egui;

#[cfg(feature = "gui")]
use beatbox::{
    config::default_presets_path,
    sequencer::{arp::MAX_RATE, arp::MIN_RATE, MAX_SWING, MAX_TEMPO, MIN_TEMPO},
    session::export_to_dir,
    ArpMode, AudioSession, BeatMachine, EngineConfig, PresetStore, Result, STEPS,
};

#[cfg(feature = "gui")]
fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = EngineConfig::load();
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 720.0])
            .with_title("BEATBOX - Drum Machine"),
        ..Default::default()
    };

    eframe::run_native(
        "BEATBOX",
        options,
        Box::new(|_cc| Ok(Box::new(BeatboxApp::new(config)))),
    )
    .map_err(|e| anyhow::anyhow!("GUI failed: {}", e))
}

#[cfg(not(feature = "gui"))]
fn main() {
    eprintln!("This binary requires the 'gui' feature to be enabled");
    std::process::exit(1);
}

#[cfg(feature = "gui")]
struct BeatboxApp {
    machine: BeatMachine,
    presets: PresetStore,
    lookahead: Duration,

    // UI state
    preset_input: String,
    selected_preset: Option<String>,
    export_dir: String,
    import_path: String,
    status: Option<String>,
}

#[cfg(feature = "gui")]
impl BeatboxApp {
    fn new(config: EngineConfig) -> Self {
        let presets_path = default_presets_path().unwrap_or_else(|| PathBuf::from("presets.json"));
        let lookahead = Duration::from_millis(config.lookahead_ms);
        let session = AudioSession::cpal(config.clone());

        Self {
            machine: BeatMachine::new(config, session),
            presets: PresetStore::open(presets_path),
            lookahead,
            preset_input: String::new(),
            selected_preset: None,
            export_dir: ".".to_string(),
            import_path: String::new(),
            status: None,
        }
    }

    /// Surface a failed action in the status line.
    fn report<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                log::error!("{}", e);
                self.status = Some(e.to_string());
                None
            }
        }
    }

    fn transport_row(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let label = if self.machine.is_playing() { "⏸ Stop" } else { "▶ Play" };
            if ui.button(label).clicked() {
                let result = self.machine.toggle_play();
                self.report(result);
            }

            ui.add_space(20.0);

            ui.label("Tempo:");
            let mut tempo = self.machine.sequencer().tempo();
            if ui.add(egui::Slider::new(&mut tempo, MIN_TEMPO..=MAX_TEMPO)).changed() {
                let result = self.machine.set_tempo(tempo);
                self.report(result);
            }

            ui.add_space(20.0);

            ui.label("Swing:");
            let mut swing = self.machine.sequencer().swing();
            if ui
                .add(egui::Slider::new(&mut swing, 0.0..=MAX_SWING).step_by(0.01))
                .changed()
            {
                let result = self.machine.set_swing(swing);
                self.report(result);
            }
        });
    }

    fn pattern_row(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if ui.button("Clear").clicked() {
                let result = self.machine.clear();
                self.report(result);
            }
            if ui.button("Electro").clicked() {
                let result = self.machine.load_electro();
                self.report(result);
            }
            if ui.button("Random").clicked() {
                let result = self.machine.randomize(beatbox::sequencer::presets::DEFAULT_DENSITY);
                self.report(result);
            }

            ui.add_space(20.0);

            let arp = self.machine.sequencer().arp();
            let mut enabled = arp.enabled;
            if ui.checkbox(&mut enabled, "Arp").changed() {
                let result = self.machine.set_arp_enabled(enabled);
                self.report(result);
            }

            let mut rate = arp.rate;
            if ui.add(egui::Slider::new(&mut rate, MIN_RATE..=MAX_RATE).text("rate")).changed() {
                let result = self.machine.set_arp_rate(rate);
                self.report(result);
            }

            let mut mode = arp.mode;
            egui::ComboBox::from_id_source("arp_mode")
                .selected_text(mode.label())
                .show_ui(ui, |ui| {
                    for candidate in ArpMode::ALL {
                        ui.selectable_value(&mut mode, candidate, candidate.label());
                    }
                });
            if mode != arp.mode {
                let result = self.machine.set_arp_mode(mode);
                self.report(result);
            }
        });
    }

    fn grid(&mut self, ui: &mut egui::Ui) {
        let tracks = self.machine.sequencer().tracks().to_vec();
        let pattern = self.machine.sequencer().pattern().clone();
        let current = self.machine.highlighted_step();

        egui::Grid::new("steps").spacing([4.0, 4.0]).show(ui, |ui| {
            for track in &tracks {
                if ui.button(&track.name).clicked() {
                    let result = self.machine.trigger_now(&track.id);
                    self.report(result);
                }

                if ui.selectable_label(track.muted, "M").clicked() {
                    let result = self.machine.toggle_mute(&track.id);
                    self.report(result);
                }
                if ui.selectable_label(track.solo, "S").clicked() {
                    let result = self.machine.toggle_solo(&track.id);
                    self.report(result);
                }

                let mut volume = track.volume;
                if ui
                    .add(egui::Slider::new(&mut volume, 0.0..=1.0).show_value(false))
                    .changed()
                {
                    let result = self.machine.set_volume(&track.id, volume);
                    self.report(result);
                }

                for step in 0..STEPS {
                    let enabled = pattern.get(&track.id, step);
                    let is_current = current == Some(step);

                    let (fill, stroke) = cell_style(enabled, is_current, step);
                    let button = egui::Button::new("")
                        .min_size(egui::vec2(28.0, 24.0))
                        .fill(fill)
                        .stroke(stroke);

                    if ui.add(button).clicked() {
                        let result = self.machine.toggle_cell(&track.id, step);
                        self.report(result);
                    }
                }
                ui.end_row();
            }
        });
    }

    fn preset_row(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label("Preset:");
            ui.text_edit_singleline(&mut self.preset_input);
            if ui.button("Save").clicked() {
                self.machine.set_preset_name(&self.preset_input);
                let snapshot = self.machine.snapshot();
                let result = self.presets.save(snapshot);
                self.report(result);
            }

            let names: Vec<String> = self.presets.names().map(str::to_string).collect();
            egui::ComboBox::from_id_source("presets")
                .selected_text(self.selected_preset.as_deref().unwrap_or("Select preset..."))
                .show_ui(ui, |ui| {
                    for name in &names {
                        ui.selectable_value(&mut self.selected_preset, Some(name.clone()), name);
                    }
                });

            if let Some(name) = self.selected_preset.clone() {
                if ui.button("Load").clicked() {
                    if let Some(snapshot) = self.presets.get(&name).cloned() {
                        let result = self.machine.load_snapshot(&snapshot);
                        if self.report(result).is_some() {
                            self.preset_input = name.clone();
                        }
                    }
                }
                if ui.button("Delete").clicked() {
                    let result = self.presets.delete(&name);
                    self.report(result);
                    self.selected_preset = None;
                }
            }
        });
    }

    fn io_row(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label("Export to:");
            ui.text_edit_singleline(&mut self.export_dir);
            if ui.button("Export").clicked() {
                let result = export_to_dir(&self.machine.snapshot(), Path::new(&self.export_dir));
                if let Some(path) = self.report(result) {
                    self.status = Some(format!("Exported to {}", path.display()));
                }
            }

            ui.add_space(20.0);

            ui.label("Import:");
            ui.text_edit_singleline(&mut self.import_path);
            if ui.button("Import").clicked() {
                let result = std::fs::read_to_string(&self.import_path)
                    .map_err(Into::into)
                    .and_then(|text| self.machine.import_json(&text));
                if self.report(result).is_some() {
                    self.preset_input = self.machine.preset_name().to_string();
                    self.status = Some("Imported".to_string());
                }
            }
        });
    }
}

/// Fill and outline of one grid cell. The playhead outline shows on lit cells too.
#[cfg(feature = "gui")]
fn cell_style(enabled: bool, is_current: bool, step: usize) -> (egui::Color32, egui::Stroke) {
    let fill = match (enabled, is_current) {
        (true, true) => egui::Color32::from_rgb(90, 160, 200),
        (true, false) => egui::Color32::from_rgb(60, 60, 200),
        (false, true) => egui::Color32::from_rgb(100, 200, 100),
        (false, false) if step % 4 == 0 => egui::Color32::from_rgb(55, 55, 55),
        (false, false) => egui::Color32::from_rgb(40, 40, 40),
    };
    let stroke = if is_current {
        egui::Stroke::new(2.0, egui::Color32::from_rgb(100, 200, 100))
    } else {
        egui::Stroke::NONE
    };
    (fill, stroke)
}

#[cfg(feature = "gui")]
impl eframe::App for BeatboxApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let result = self.machine.pump(Instant::now());
        self.report(result);
        if self.machine.is_playing() {
            ctx.request_repaint_after(self.lookahead);
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("BEATBOX - Drum Machine");
            ui.add_space(10.0);

            self.transport_row(ui);
            ui.add_space(10.0);
            self.pattern_row(ui);

            ui.add_space(20.0);
            self.grid(ui);
            ui.add_space(20.0);

            self.preset_row(ui);
            self.io_row(ui);

            // Info
            ui.separator();
            ui.label("Click a track name to audition it, click steps to toggle them");
            if let Some(status) = &self.status {
                ui.colored_label(egui::Color32::YELLOW, status);
            }
        });
    }
}

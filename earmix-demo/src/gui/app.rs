use super::profiling::{self, TIMING_HISTORY};
use crate::tones::{self, TONE_NAMES};
use earmix::{
    AudioInstance, ClipCache, CpalSink, EarMixDesc, EarMixEngine, EarMixEvent, InstanceId,
    InstanceParams, MixTimingEvent, PlayState, Quat, Vec3,
};
use egui::{Color32, Pos2, Rect, Stroke, Vec2};
use std::collections::VecDeque;

struct AudioSource {
    instance: AudioInstance,
    position: Vec3,
    tone: &'static str,
    looping: bool,
}

impl AudioSource {
    fn id(&self) -> InstanceId {
        self.instance.id()
    }
}

pub struct SpatialAudioDemo {
    engine: EarMixEngine,
    clips: ClipCache,
    sources: Vec<AudioSource>,
    grid_size: f32,

    // Listener
    listener_position: Vec3,
    listener_yaw: f32,
    teleport_pending: bool,

    // Knobs mirrored from the engine
    master_volume: f32,
    head_width: f32,
    speed_of_sound: f32,
    falloff_distance: f32,
    directional_minimum: f32,

    // UI state
    selected_tone_index: usize,
    new_source_looping: bool,
    new_source_gain: f32,
    add_source_mode: bool,
    dragging_source_index: Option<usize>,
    dragging_listener: bool,
    timing_history: VecDeque<MixTimingEvent>,
    last_error: Option<String>,
}

impl SpatialAudioDemo {
    pub fn new() -> Self {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();

        let desc = EarMixDesc::default();
        let acoustics = desc.acoustics;
        let directional_minimum = desc.ears.first().map_or(0.3, |ear| ear.directional_minimum);

        let clips = ClipCache::new();
        tones::register_tones(&clips, desc.sample_rate);

        let mut engine = EarMixEngine::new(desc.clone()).expect("default descriptor is valid");
        let mut last_error = None;
        if let Err(e) = engine.init_with(move || CpalSink::open(&desc)) {
            log::error!("Failed to start mixer: {}", e);
            last_error = Some(e.to_string());
        }

        Self {
            engine,
            clips,
            sources: Vec::new(),
            grid_size: 8.0,
            listener_position: Vec3::ZERO,
            listener_yaw: 0.0,
            teleport_pending: true,
            master_volume: acoustics.master_volume,
            head_width: acoustics.head_width,
            speed_of_sound: acoustics.speed_of_sound,
            falloff_distance: acoustics.linear_falloff_distance,
            directional_minimum,
            selected_tone_index: 0,
            new_source_looping: true,
            new_source_gain: 1.0,
            add_source_mode: false,
            dragging_source_index: None,
            dragging_listener: false,
            timing_history: VecDeque::with_capacity(TIMING_HISTORY),
            last_error,
        }
    }

    fn listener_forward(&self) -> Vec3 {
        Quat::from_rotation_y(self.listener_yaw) * Vec3::NEG_Z
    }

    fn world_to_screen(&self, world_pos: Vec3, rect: Rect) -> Pos2 {
        // Top-down view: X right, -Z (the default forward) up the screen
        let center = rect.center();
        let scale = rect.width().min(rect.height()) / (self.grid_size * 2.0);

        Pos2::new(center.x + world_pos.x * scale, center.y + world_pos.z * scale)
    }

    fn screen_to_world(&self, screen_pos: Pos2, rect: Rect) -> Vec3 {
        let center = rect.center();
        let scale = rect.width().min(rect.height()) / (self.grid_size * 2.0);

        Vec3::new(
            ((screen_pos.x - center.x) / scale).clamp(-self.grid_size, self.grid_size),
            0.0,
            ((screen_pos.y - center.y) / scale).clamp(-self.grid_size, self.grid_size),
        )
    }

    fn draw_grid(&self, ui: &mut egui::Ui, rect: Rect) {
        let painter = ui.painter();
        let lines = self.grid_size as i32;

        for i in -lines..=lines {
            let offset = i as f32;
            let top = self.world_to_screen(Vec3::new(offset, 0.0, -self.grid_size), rect);
            let bottom = self.world_to_screen(Vec3::new(offset, 0.0, self.grid_size), rect);
            painter.line_segment([top, bottom], Stroke::new(1.0, Color32::from_gray(60)));

            let left = self.world_to_screen(Vec3::new(-self.grid_size, 0.0, offset), rect);
            let right = self.world_to_screen(Vec3::new(self.grid_size, 0.0, offset), rect);
            painter.line_segment([left, right], Stroke::new(1.0, Color32::from_gray(60)));
        }

        // Linear falloff radius around the listener
        let center = self.world_to_screen(self.listener_position, rect);
        let scale = rect.width().min(rect.height()) / (self.grid_size * 2.0);
        painter.circle_stroke(
            center,
            self.falloff_distance * scale,
            Stroke::new(1.0, Color32::from_rgb(90, 90, 140)),
        );
    }

    fn draw_listener(&self, ui: &mut egui::Ui, rect: Rect) {
        let painter = ui.painter();
        let center = self.world_to_screen(self.listener_position, rect);
        let forward = self.listener_forward();
        let nose = self.world_to_screen(self.listener_position + forward * 0.8, rect);

        painter.line_segment([center, nose], Stroke::new(2.0, Color32::WHITE));
        painter.circle_filled(center, 9.0, Color32::from_rgb(255, 50, 50));
        painter.circle_stroke(center, 9.0, Stroke::new(2.0, Color32::WHITE));

        // Ears sit on the listener's left and right
        let right = forward.cross(Vec3::Y).normalize_or_zero();
        for (side, label) in [(-1.0, "L"), (1.0, "R")] {
            let ear = self.world_to_screen(self.listener_position + right * side * 0.45, rect);
            painter.text(
                ear,
                egui::Align2::CENTER_CENTER,
                label,
                egui::FontId::proportional(11.0),
                Color32::LIGHT_GRAY,
            );
        }
    }

    fn draw_sources(&self, ui: &mut egui::Ui, rect: Rect) {
        let painter = ui.painter();

        for source in &self.sources {
            let pos = self.world_to_screen(source.position, rect);
            let color = match source.instance.state() {
                PlayState::Paused => Color32::from_gray(120),
                _ => Color32::from_rgb(50, 150, 255),
            };

            painter.circle_filled(pos, 8.0, color);
            painter.circle_stroke(pos, 8.0, Stroke::new(2.0, Color32::WHITE));

            let distance = source.position.distance(self.listener_position);
            painter.text(
                pos + Vec2::new(0.0, 12.0),
                egui::Align2::CENTER_TOP,
                format!("{} ({:.1}m)", source.tone, distance),
                egui::FontId::proportional(12.0),
                Color32::WHITE,
            );
        }
    }

    fn handle_mouse_interaction(&mut self, ui: &mut egui::Ui, rect: Rect) {
        let response = ui.allocate_rect(rect, egui::Sense::click_and_drag());

        if self.add_source_mode && response.clicked() {
            if let Some(pos) = response.interact_pointer_pos() {
                let world_pos = self.screen_to_world(pos, rect);
                self.add_source_at_position(world_pos);
                self.add_source_mode = false;
            }
            return;
        }

        if response.drag_started() {
            if let Some(pos) = response.interact_pointer_pos() {
                let near = |world: Vec3| self.world_to_screen(world, rect).distance(pos) < 15.0;
                let source_index = self.sources.iter().position(|s| near(s.position));
                let listener = source_index.is_none() && near(self.listener_position);
                self.dragging_source_index = source_index;
                self.dragging_listener = listener;
            }
        }

        if response.dragged() {
            if let Some(pos) = response.interact_pointer_pos() {
                let world_pos = self.screen_to_world(pos, rect);
                if let Some(source) = self
                    .dragging_source_index
                    .and_then(|idx| self.sources.get_mut(idx))
                {
                    source.position = world_pos;
                    source.instance.set_position(Some(world_pos));
                } else if self.dragging_listener {
                    self.listener_position = world_pos;
                }
            }
        }

        if response.drag_stopped() {
            self.dragging_source_index = None;
            self.dragging_listener = false;
        }
    }

    fn add_source_at_position(&mut self, position: Vec3) {
        let tone = TONE_NAMES[self.selected_tone_index];
        let params = InstanceParams::spatial(position)
            .gain(self.new_source_gain)
            .looping(self.new_source_looping);

        let Some(instance) = self.engine.instance_of(&self.clips, tone, params) else {
            self.last_error = Some(format!("Tone '{}' is not loaded", tone));
            return;
        };
        self.engine.add(&instance);

        log::info!(
            "GUI: Added '{}' as {} at ({:.1}, {:.1})",
            tone,
            instance.id(),
            position.x,
            position.z
        );

        self.sources.push(AudioSource {
            instance,
            position,
            tone,
            looping: self.new_source_looping,
        });
    }

    fn handle_events(&mut self) {
        for event in self.engine.poll_events() {
            match event {
                EarMixEvent::MixTiming(timing) => {
                    if self.timing_history.len() == TIMING_HISTORY {
                        self.timing_history.pop_front();
                    }
                    self.timing_history.push_back(timing);
                }
                EarMixEvent::InstanceCompleted { instance_id }
                | EarMixEvent::InstanceStopped { instance_id } => {
                    self.sources.retain(|s| s.id() != instance_id);
                    log::info!("GUI: {} finished, removed from the scene", instance_id);
                }
                EarMixEvent::EngineError { error } => {
                    log::error!("GUI: Mixer died: {}", error);
                    self.last_error = Some(error);
                }
                other => log::debug!("GUI: Received event: {:?}", other),
            }
        }
    }

    fn draw_controls(&mut self, ui: &mut egui::Ui) {
        ui.heading("Control Panel");
        ui.separator();

        ui.label("Tone:");
        egui::ComboBox::from_id_salt("tone")
            .selected_text(TONE_NAMES[self.selected_tone_index])
            .show_ui(ui, |ui| {
                for (idx, name) in TONE_NAMES.iter().enumerate() {
                    ui.selectable_value(&mut self.selected_tone_index, idx, *name);
                }
            });
        ui.checkbox(&mut self.new_source_looping, "Loop");
        ui.add(egui::Slider::new(&mut self.new_source_gain, 0.0..=2.0).text("Gain"));

        let button_text = if self.add_source_mode {
            "Click on grid to place..."
        } else {
            "Add Source"
        };
        if ui.button(button_text).clicked() {
            self.add_source_mode = !self.add_source_mode;
        }

        ui.add_space(10.0);
        ui.separator();
        ui.label("Listener");
        ui.add(
            egui::Slider::new(&mut self.listener_yaw, -std::f32::consts::PI..=std::f32::consts::PI)
                .text("Yaw"),
        );
        if ui.button("Teleport to origin").clicked() {
            self.listener_position = Vec3::ZERO;
            self.teleport_pending = true;
        }

        ui.add_space(10.0);
        ui.separator();
        ui.label("Acoustics");
        if ui
            .add(egui::Slider::new(&mut self.master_volume, 0.0..=2.0).text("Master volume"))
            .changed()
        {
            self.engine.set_master_volume(self.master_volume);
        }
        if ui
            .add(egui::Slider::new(&mut self.head_width, 0.0..=2.0).text("Head width"))
            .changed()
        {
            self.apply(|engine, value| engine.set_head_width(value), self.head_width);
        }
        if ui
            .add(
                egui::Slider::new(&mut self.speed_of_sound, 10.0..=1000.0)
                    .logarithmic(true)
                    .text("Speed of sound"),
            )
            .changed()
        {
            self.apply(|engine, value| engine.set_speed_of_sound(value), self.speed_of_sound);
        }
        if ui
            .add(egui::Slider::new(&mut self.falloff_distance, 0.1..=10.0).text("Falloff"))
            .changed()
        {
            self.apply(
                |engine, value| engine.set_linear_falloff_distance(value),
                self.falloff_distance,
            );
        }
        if ui
            .add(
                egui::Slider::new(&mut self.directional_minimum, 0.0..=1.0)
                    .text("Directional minimum"),
            )
            .changed()
        {
            let minimum = self.directional_minimum;
            for channel in 0..self.engine.desc().ears.len() {
                self.apply(
                    |engine, value| engine.set_directional_minimum(channel, value),
                    minimum,
                );
            }
        }

        ui.add_space(10.0);
        ui.separator();
        profiling::draw_level_meter(ui, self.engine.current_level());
        if !self.engine.is_running() {
            ui.colored_label(Color32::RED, "Mixer is not running");
            if ui.button("Restart mixer").clicked() {
                self.restart();
            }
        }
        if let Some(error) = &self.last_error {
            ui.colored_label(Color32::RED, error);
        }
        profiling::draw_profiling_widget(
            ui,
            &self.timing_history,
            self.engine.desc().pause.as_micros() as u64,
        );

        ui.add_space(10.0);
        ui.separator();
        ui.label(format!("Active Sources: {}", self.sources.len()));

        egui::ScrollArea::vertical().show(ui, |ui| {
            for source in &self.sources {
                ui.group(|ui| {
                    ui.label(format!("{}: {}", source.id(), source.tone));
                    ui.label(format!(
                        "  Pos: ({:.1}, {:.1})  Loop: {}",
                        source.position.x, source.position.z, source.looping
                    ));
                    ui.horizontal(|ui| {
                        match source.instance.state() {
                            PlayState::Paused => {
                                if ui.button("Resume").clicked() {
                                    self.engine.add(&source.instance);
                                }
                            }
                            _ => {
                                if ui.button("Pause").clicked() {
                                    source.instance.pause();
                                }
                            }
                        }
                        if ui.button("Stop").clicked() {
                            source.instance.stop();
                        }
                    });
                });
            }
        });
    }

    fn apply(&mut self, set: impl FnOnce(&EarMixEngine, f32) -> earmix::Result<()>, value: f32) {
        if let Err(e) = set(&self.engine, value) {
            log::warn!("GUI: {}", e);
            self.last_error = Some(e.to_string());
        }
    }

    fn restart(&mut self) {
        let desc = self.engine.desc().clone();
        self.last_error = None;
        if let Err(e) = self.engine.init_with(move || CpalSink::open(&desc)) {
            self.last_error = Some(e.to_string());
        }
    }
}

impl eframe::App for SpatialAudioDemo {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_events();

        let dt = ctx.input(|i| i.stable_dt);
        let forward = self.listener_forward();
        let teleport = std::mem::take(&mut self.teleport_pending);
        self.engine
            .frame_update(self.listener_position, forward, Vec3::Y, teleport, dt);

        egui::SidePanel::right("control_panel")
            .default_width(280.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical()
                    .id_salt("controls")
                    .show(ui, |ui| self.draw_controls(ui));
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("EarMix Binaural Demo");

            let instruction = if self.add_source_mode {
                "Click anywhere on the grid to add a new source"
            } else {
                "Drag sources or the listener to move them"
            };
            ui.label(instruction);
            ui.separator();

            let available_size = ui.available_size();
            let size = available_size.x.min(available_size.y) - 20.0;
            let rect =
                Rect::from_center_size(ui.available_rect_before_wrap().center(), Vec2::splat(size));

            self.draw_grid(ui, rect);
            self.draw_sources(ui, rect);
            self.draw_listener(ui, rect);
            self.handle_mouse_interaction(ui, rect);
        });

        ctx.request_repaint();
    }
}

impl Drop for SpatialAudioDemo {
    fn drop(&mut self) {
        log::info!("Shutting down mixer");
        self.engine.shutdown();
    }
}

//! Per-frame statistics.

/// Counters for one [`render_frame`](super::Renderer::render_frame) call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameInfo {
    /// Frame counter, starting at 1.
    pub frame: u64,
    pub draw_calls: u32,
    pub triangles: u64,
    /// Live programs after the frame.
    pub programs: usize,
    /// Programs compiled during the frame.
    pub compiles: u32,
    /// Drawables not drawn (failed or pending program, empty range,
    /// missing asset).
    pub skipped: u32,
    /// Whether the transmission pre-pass ran.
    pub transmission_pass: bool,
}

impl FrameInfo {
    pub(crate) fn record_draw(&mut self, count: u32, instances: u32) {
        self.draw_calls += 1;
        self.triangles += u64::from(count / 3) * u64::from(instances.max(1));
    }
}

/// Device memory held by the renderer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryInfo {
    pub geometries: usize,
    pub textures: usize,
    pub programs: usize,
}

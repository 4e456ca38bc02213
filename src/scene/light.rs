use glam::Vec3;

/// Shadow parameters; shadow maps themselves are produced outside the core.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowConfig {
    pub bias: f32,
    pub normal_bias: f32,
    pub radius: f32,
    pub map_size: u32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            bias: 0.0,
            normal_bias: 0.0,
            radius: 1.0,
            map_size: 512,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LightKind {
    Ambient,
    /// Sky color is the light color.
    Hemisphere { ground_color: Vec3 },
    /// Shines along the owning node's -Z axis.
    Directional,
    Point {
        /// Cutoff distance, 0 for infinite.
        distance: f32,
        decay: f32,
    },
    /// Cone along the owning node's -Z axis.
    Spot {
        distance: f32,
        /// Half-angle of the cone in radians.
        angle: f32,
        penumbra: f32,
        decay: f32,
    },
}

impl LightKind {
    /// Whether this kind can cast shadows at all.
    #[must_use]
    pub fn supports_shadow(&self) -> bool {
        matches!(
            self,
            LightKind::Directional | LightKind::Point { .. } | LightKind::Spot { .. }
        )
    }
}

/// Light component attached to a node.
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub color: Vec3,
    pub intensity: f32,
    pub kind: LightKind,
    pub cast_shadow: bool,
    pub shadow: ShadowConfig,
}

impl Light {
    fn with_kind(color: Vec3, intensity: f32, kind: LightKind) -> Self {
        Self {
            color,
            intensity,
            kind,
            cast_shadow: false,
            shadow: ShadowConfig::default(),
        }
    }

    #[must_use]
    pub fn new_ambient(color: Vec3, intensity: f32) -> Self {
        Self::with_kind(color, intensity, LightKind::Ambient)
    }

    #[must_use]
    pub fn new_hemisphere(sky: Vec3, ground: Vec3, intensity: f32) -> Self {
        Self::with_kind(sky, intensity, LightKind::Hemisphere { ground_color: ground })
    }

    #[must_use]
    pub fn new_directional(color: Vec3, intensity: f32) -> Self {
        Self::with_kind(color, intensity, LightKind::Directional)
    }

    #[must_use]
    pub fn new_point(color: Vec3, intensity: f32, distance: f32) -> Self {
        Self::with_kind(
            color,
            intensity,
            LightKind::Point {
                distance,
                decay: 2.0,
            },
        )
    }

    #[must_use]
    pub fn new_spot(color: Vec3, intensity: f32, distance: f32, angle: f32, penumbra: f32) -> Self {
        Self::with_kind(
            color,
            intensity,
            LightKind::Spot {
                distance,
                angle,
                penumbra,
                decay: 2.0,
            },
        )
    }

    #[must_use]
    pub fn with_shadow(mut self) -> Self {
        self.cast_shadow = self.kind.supports_shadow();
        self
    }

    /// Whether this light contributes a shadow map this frame.
    #[must_use]
    pub fn casts_shadow(&self) -> bool {
        self.cast_shadow && self.kind.supports_shadow()
    }
}

/// Scene fog.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fog {
    Linear { color: Vec3, near: f32, far: f32 },
    Exp2 { color: Vec3, density: f32 },
}

impl Fog {
    #[must_use]
    pub fn color(&self) -> Vec3 {
        match *self {
            Fog::Linear { color, .. } | Fog::Exp2 { color, .. } => color,
        }
    }
}

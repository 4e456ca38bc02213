use glam::{Affine3A, EulerRot, Mat3, Mat4, Quat, Vec3};

/// Transform component.
///
/// Holds the node's local TRS, the cached local and world matrices and the
/// dirty state driving the hierarchy update. Local dirtiness is detected by
/// comparing the public TRS fields against a shadow copy, so writing
/// `transform.position` directly is enough to schedule a recompose.
#[derive(Debug, Clone)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,

    /// Recompose the local matrix from TRS during hierarchy updates.
    pub matrix_auto_update: bool,
    /// Let the hierarchy update rewrite this node's world matrix.
    ///
    /// Nodes that opt out keep their world matrix until updated by hand, but
    /// a forced update still reaches their children.
    pub matrix_world_auto_update: bool,

    pub(crate) local_matrix: Affine3A,
    pub(crate) world_matrix: Affine3A,

    // Shadow state
    last_position: Vec3,
    last_rotation: Quat,
    last_scale: Vec3,
    force_update: bool,

    world_needs_update: bool,
    world_version: u64,
}

impl Transform {
    #[must_use]
    pub fn new() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,

            matrix_auto_update: true,
            matrix_world_auto_update: true,

            local_matrix: Affine3A::IDENTITY,
            world_matrix: Affine3A::IDENTITY,

            last_position: Vec3::ZERO,
            last_rotation: Quat::IDENTITY,
            last_scale: Vec3::ONE,
            force_update: true,

            world_needs_update: true,
            world_version: 0,
        }
    }

    #[must_use]
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::new()
        }
    }

    // ========================================================================
    // Local matrix (shadow state check)
    // ========================================================================

    /// Sets the full local TRS at once.
    pub fn set_local(&mut self, position: Vec3, rotation: Quat, scale: Vec3) {
        self.position = position;
        self.rotation = rotation;
        self.scale = scale;
    }

    /// Whether the next [`update_local_matrix`](Self::update_local_matrix)
    /// will recompose.
    #[must_use]
    pub fn is_local_dirty(&self) -> bool {
        self.force_update
            || self.position != self.last_position
            || self.rotation != self.last_rotation
            || self.scale != self.last_scale
    }

    /// Recomposes the local matrix if TRS changed. Returns whether it did.
    pub fn update_local_matrix(&mut self) -> bool {
        let changed = self.is_local_dirty();

        if changed {
            self.local_matrix =
                Affine3A::from_scale_rotation_translation(self.scale, self.rotation, self.position);

            self.last_position = self.position;
            self.last_rotation = self.rotation;
            self.last_scale = self.scale;
            self.force_update = false;
            self.world_needs_update = true;
        }

        changed
    }

    /// Sets the local matrix directly, e.g. from an importer or physics.
    ///
    /// TRS is refreshed by decomposition. Shear is kept in the matrix but lost
    /// from the TRS fields.
    pub fn apply_local_matrix(&mut self, mat: Affine3A) {
        self.local_matrix = mat;

        let (scale, rotation, translation) = mat.to_scale_rotation_translation();
        self.scale = scale;
        self.rotation = rotation;
        self.position = translation;

        self.last_scale = scale;
        self.last_rotation = rotation;
        self.last_position = translation;
        self.force_update = false;
        self.world_needs_update = true;
    }

    pub fn apply_local_matrix_from_mat4(&mut self, mat: Mat4) {
        self.apply_local_matrix(Affine3A::from_mat4(mat));
    }

    /// Forces a recompose on the next update.
    pub fn mark_dirty(&mut self) {
        self.force_update = true;
    }

    // ========================================================================
    // World matrix
    // ========================================================================

    /// Whether the world matrix will be rewritten even without a forced update.
    #[inline]
    #[must_use]
    pub fn world_needs_update(&self) -> bool {
        self.world_needs_update
    }

    /// Requests a world matrix rewrite on the next hierarchy update.
    pub fn mark_world_dirty(&mut self) {
        self.world_needs_update = true;
    }

    /// Writes the world matrix and bumps [`world_version`](Self::world_version).
    pub fn set_world_matrix(&mut self, mat: Affine3A) {
        self.world_matrix = mat;
        self.world_needs_update = false;
        self.world_version = self.world_version.wrapping_add(1);
    }

    /// Clears the pending world update without rewriting the matrix.
    pub(crate) fn clear_world_dirty(&mut self) {
        self.world_needs_update = false;
    }

    /// Counts world matrix rewrites.
    #[inline]
    #[must_use]
    pub fn world_version(&self) -> u64 {
        self.world_version
    }

    // ========================================================================
    // Getters & helpers
    // ========================================================================

    pub fn set_rotation_euler(&mut self, x: f32, y: f32, z: f32) {
        self.rotation = Quat::from_euler(EulerRot::XYZ, x, y, z);
    }

    #[must_use]
    pub fn rotation_euler(&self) -> Vec3 {
        let (x, y, z) = self.rotation.to_euler(EulerRot::XYZ);
        Vec3::new(x, y, z)
    }

    pub fn set_rotation_euler_with_order(&mut self, x: f32, y: f32, z: f32, order: EulerRot) {
        self.rotation = Quat::from_euler(order, x, y, z);
    }

    #[inline]
    #[must_use]
    pub fn local_matrix(&self) -> &Affine3A {
        &self.local_matrix
    }

    #[inline]
    #[must_use]
    pub fn world_matrix(&self) -> &Affine3A {
        &self.world_matrix
    }

    #[inline]
    #[must_use]
    pub fn world_matrix_as_mat4(&self) -> Mat4 {
        Mat4::from(self.world_matrix)
    }

    #[inline]
    #[must_use]
    pub fn world_position(&self) -> Vec3 {
        self.world_matrix.translation.into()
    }

    /// Rotates so that -Z points at `target`, both in the parent's space.
    ///
    /// Degenerate input (target on the up axis, or at the position) is ignored.
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        let to_target = target - self.position;
        if to_target.length_squared() < 1e-12 {
            return;
        }
        let forward = to_target.normalize();

        if forward.cross(up).length_squared() < 1e-4 {
            return;
        }

        let right = forward.cross(up).normalize();
        let new_up = right.cross(forward).normalize();

        let rot_mat = Mat3::from_cols(right, new_up, -forward);
        self.rotation = Quat::from_mat3(&rot_mat);
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recompose_only_when_changed() {
        let mut t = Transform::new();
        assert!(t.update_local_matrix());
        assert!(!t.update_local_matrix());

        t.position = Vec3::new(1.0, 2.0, 3.0);
        assert!(t.is_local_dirty());
        assert!(t.update_local_matrix());
        assert_eq!(t.local_matrix().translation, Vec3::new(1.0, 2.0, 3.0).into());
    }

    #[test]
    fn apply_local_matrix_syncs_trs() {
        let mut t = Transform::new();
        t.apply_local_matrix(Affine3A::from_translation(Vec3::Y));
        assert_eq!(t.position, Vec3::Y);
        assert!(!t.is_local_dirty());
        assert!(t.world_needs_update());
    }

    #[test]
    fn look_at_points_negative_z() {
        let mut t = Transform::new();
        t.look_at(Vec3::new(10.0, 0.0, 0.0), Vec3::Y);
        let forward = t.rotation * Vec3::NEG_Z;
        assert!(forward.abs_diff_eq(Vec3::X, 1e-5));
    }

    #[test]
    fn world_version_counts_writes() {
        let mut t = Transform::new();
        t.set_world_matrix(Affine3A::IDENTITY);
        t.set_world_matrix(Affine3A::IDENTITY);
        assert_eq!(t.world_version(), 2);
    }
}

//! Physical phase: integrate motion for mobile entities

use crate::entity::capabilities::Capability;
use crate::simulation::world::World;

/// `position += velocity * speed * dt`, then velocity decays as `exp(-dt)`
pub(crate) fn update_motion(world: &mut World, dt: f64) {
    if dt <= 0.0 {
        return;
    }
    let friction = (-dt).exp();
    for entity in world
        .entities
        .iter_mut()
        .filter(|e| e.essence.mobile && e.has(Capability::Motion))
    {
        let step = entity.speed * dt;
        let next_x = entity.position.x + entity.velocity.x * step;
        let next_y = entity.position.y + entity.velocity.y * step;
        if next_x.is_finite() && next_y.is_finite() {
            entity.position.x = next_x;
            entity.position.y = next_y;
        }
        entity.velocity.x *= friction;
        entity.velocity.y *= friction;
    }
}

//! Communication phase: deliver due messages, expire stale ones

use tracing::trace;

use crate::entity::capabilities::Capability;
use crate::entity::inbox::Message;
use crate::simulation::world::World;

pub(crate) fn deliver_messages(world: &mut World) {
    let now = world.time;
    let (due, waiting): (Vec<Message>, Vec<Message>) = std::mem::take(&mut world.outbox)
        .into_iter()
        .partition(|m| m.deliver_at <= now);
    world.outbox = waiting;

    for message in due {
        match &message.recipient {
            Some(recipient) => {
                let Some(idx) = world.index_of(recipient) else {
                    trace!(recipient = %recipient, "Dropping message for missing entity");
                    continue;
                };
                let entity = &mut world.entities[idx];
                if entity.has(Capability::Communication) {
                    entity.inbox.push(message);
                }
            }
            None => {
                for entity in world
                    .entities
                    .iter_mut()
                    .filter(|e| e.has(Capability::Communication))
                {
                    entity.inbox.push(message.clone());
                }
            }
        }
    }

    let ttl = world.config.communication.message_ttl;
    for entity in &mut world.entities {
        entity.inbox.expire(now, ttl);
    }
}

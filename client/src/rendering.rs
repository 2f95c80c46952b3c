use crate::world::World;
use macroquad::prelude::*;
use shared::{ClientId, Vec3};

/// Screen pixels per world unit.
pub const PIXELS_PER_UNIT: f32 = 12.0;
const ACTOR_RADIUS: f32 = 8.0;
const GRID_SPACING: f32 = 5.0;

#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub local_id: Option<ClientId>,
    pub rtt_ms: Option<u32>,
}

/// Top-down view centred on the local actor. World +Z points up the screen.
pub struct Renderer {
    width: f32,
    height: f32,
}

impl Renderer {
    pub fn new(width: usize, height: usize) -> Self {
        Renderer {
            width: width as f32,
            height: height as f32,
        }
    }

    pub fn render(&mut self, world: &World, config: RenderConfig) {
        clear_background(Color::from_rgba(26, 26, 26, 255));

        let origin = world.me.state.position;
        self.draw_grid(origin);

        for (id, actor) in world.remotes.iter() {
            if !actor.should_interpolate {
                continue;
            }
            let color = id_color(id);
            self.draw_actor(origin, actor.position, actor.rotation, color);
            self.draw_label(origin, actor.position, &actor.host, color);
        }

        self.draw_actor(origin, origin, world.me.state.rotation, GREEN);
        self.draw_ui(world, &config);
    }

    fn to_screen(&self, origin: Vec3, point: Vec3) -> (f32, f32) {
        world_to_screen(origin, point, self.width, self.height)
    }

    fn draw_grid(&mut self, origin: Vec3) {
        let color = Color::from_rgba(51, 51, 51, 255);
        let half_w = self.width / 2.0 / PIXELS_PER_UNIT;
        let half_h = self.height / 2.0 / PIXELS_PER_UNIT;

        let mut x = ((origin.x - half_w) / GRID_SPACING).floor() * GRID_SPACING;
        while x <= origin.x + half_w {
            let (sx, _) = self.to_screen(origin, Vec3::new(x, 0.0, origin.z));
            draw_line(sx, 0.0, sx, self.height, 1.0, color);
            x += GRID_SPACING;
        }

        let mut z = ((origin.z - half_h) / GRID_SPACING).floor() * GRID_SPACING;
        while z <= origin.z + half_h {
            let (_, sy) = self.to_screen(origin, Vec3::new(origin.x, 0.0, z));
            draw_line(0.0, sy, self.width, sy, 1.0, color);
            z += GRID_SPACING;
        }
    }

    fn draw_actor(&mut self, origin: Vec3, position: Vec3, rotation: f32, color: Color) {
        let (sx, sy) = self.to_screen(origin, position);
        draw_circle(sx, sy, ACTOR_RADIUS, color);
        draw_circle_lines(sx, sy, ACTOR_RADIUS, 2.0, WHITE);

        let yaw = rotation.to_radians();
        let tip_x = sx + yaw.sin() * ACTOR_RADIUS * 2.0;
        let tip_y = sy - yaw.cos() * ACTOR_RADIUS * 2.0;
        draw_line(sx, sy, tip_x, tip_y, 2.0, YELLOW);
    }

    fn draw_label(&mut self, origin: Vec3, position: Vec3, text: &str, color: Color) {
        let (sx, sy) = self.to_screen(origin, position);
        draw_text(text, sx + ACTOR_RADIUS + 4.0, sy - ACTOR_RADIUS, 14.0, color);
    }

    fn draw_ui(&mut self, world: &World, config: &RenderConfig) {
        let connection_color = if config.local_id.is_some() { GREEN } else { RED };
        draw_rectangle(10.0, 10.0, 8.0, 8.0, connection_color);

        let id_text = match config.local_id {
            Some(id) => format!("client {}", id),
            None => "waiting for id".to_string(),
        };
        draw_text(&id_text, 24.0, 18.0, 14.0, WHITE);

        let ping_text = match config.rtt_ms {
            Some(rtt) => format!("{}ms", rtt),
            None => "--ms".to_string(),
        };
        draw_text(&ping_text, 10.0, 36.0, 14.0, WHITE);

        let peers_text = format!("{} remote actors", world.remotes.len());
        draw_text(&peers_text, 10.0, 54.0, 14.0, WHITE);

        let state = world.me.state;
        let pose = format!(
            "x {:.1} z {:.1} yaw {:.0}",
            state.position.x, state.position.z, state.rotation
        );
        draw_text(&pose, 10.0, 72.0, 14.0, WHITE);
    }
}

/// Screen coordinates of `point` with `origin` at the centre.
pub fn world_to_screen(origin: Vec3, point: Vec3, width: f32, height: f32) -> (f32, f32) {
    (
        width / 2.0 + (point.x - origin.x) * PIXELS_PER_UNIT,
        height / 2.0 - (point.z - origin.z) * PIXELS_PER_UNIT,
    )
}

fn id_color(id: ClientId) -> Color {
    match id % 8 {
        0 => WHITE,
        1 => RED,
        2 => SKYBLUE,
        3 => BLUE,
        4 => YELLOW,
        5 => MAGENTA,
        6 => Color::from_rgba(0, 255, 255, 255),
        _ => Color::from_rgba(136, 136, 136, 255),
    }
}

//! Per-planet textures and constants shared by every patch of the planet.

use crate::draw::PassTextures;
use crate::handle::TextureHandle;

/// Textures and surface constants of one planet.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlanetMaterials {
    /// Terrain color lookup indexed by climate.
    pub terrain_color_map: Option<TextureHandle>,
    /// Terrain detail texture.
    pub terrain_texture: Option<TextureHandle>,
    /// Liquid color lookup indexed by depth and temperature.
    pub liquid_color_map: Option<TextureHandle>,
    /// Liquid detail texture.
    pub liquid_texture: Option<TextureHandle>,
    /// Scale applied to water depth before the color lookup.
    pub liquid_depth_scale: f32,
    /// Temperature below which liquid freezes, 0–255.
    pub liquid_freeze_temp: f32,
    /// Planet radius used for horizon culling.
    pub radius: f64,
}

impl PlanetMaterials {
    /// Untextured materials for a planet of the given radius.
    pub fn untextured(radius: f64) -> Self {
        Self {
            liquid_depth_scale: 1.0,
            liquid_freeze_temp: 0.0,
            radius,
            ..Self::default()
        }
    }

    pub(crate) fn water_textures(&self) -> PassTextures {
        PassTextures {
            color_map: self.liquid_color_map,
            surface: self.liquid_texture,
        }
    }

    pub(crate) fn terrain_textures(&self) -> PassTextures {
        PassTextures {
            color_map: self.terrain_color_map,
            surface: self.terrain_texture,
        }
    }
}

/*!
 * This module contains all logic for producing scene content that is not
 * registered by the host: generated spheres and texture atlases.
 */
pub mod atlas;
pub mod primitives;

mod assembly;
mod basis;
mod halo;

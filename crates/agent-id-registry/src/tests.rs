mod custody;
mod helpers;
mod lifecycle;
mod rotation;
mod trust;

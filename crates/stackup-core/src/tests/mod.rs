mod lifecycle;
mod retention;

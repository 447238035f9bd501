mod concurrent;
mod rebuild;

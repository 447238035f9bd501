mod links;
mod pipeline;

pub mod prune_orphaned_images;

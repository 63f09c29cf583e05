use vfs_tar::{EntryType, FsBackend, TarFS, TarFSOptions};

fn main() {
    // RUST_LOG=debug shows every archive rewrite
    env_logger::init();

    let tmp = std::env::temp_dir();
    let archive = tmp.join("my_vfs.tar");
    println!("Archive: {}", archive.display());

    // opens the archive if it is there, otherwise bootstraps it with
    // `/hello`, `/dir` and `/dir/file`
    let mut fs = if archive.exists() {
        TarFS::open(&archive).unwrap()
    } else {
        let mut options = TarFSOptions::new();
        options.set_default_archive(&archive);
        TarFS::open_with("", options).unwrap()
    };

    // every successful create is already in the archive when it returns
    if !fs.exists("/docs") {
        fs.create("/docs", 0, EntryType::Directory).unwrap();
    }

    // change inner CWD to `/docs`
    fs.cd("docs").unwrap();

    // `first.txt` is created in CWD because the name is relative
    if !fs.exists("first.txt") {
        fs.create("first.txt", 5, EntryType::File).unwrap();
    }
    assert!(fs.exists("/docs/first.txt"));

    // copying into an existing directory keeps the source name
    if !fs.exists("/docs/hello") {
        let target = fs.copy("/hello", ".").unwrap();
        println!("copied /hello to {target}");
    }

    // never overwrites
    if let Err(e) = fs.copy("/hello", "/docs/hello") {
        println!("{e}");
    }

    fs.cd("..").unwrap();
    println!("ls /: {}", fs.ls("/").unwrap().join(" "));
    print!("{}", fs.tree("/"));
    println!("find file: {:?}", fs.find("file"));
}

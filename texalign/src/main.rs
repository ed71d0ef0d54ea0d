use structopt::StructOpt;

use texalign::align::AlignCommand;

#[derive(StructOpt)]
#[structopt(about = "Multi-view texture alignment over a mesh")]
enum Command {
    Align(AlignCommand),
}

fn main() {
    let res = match Command::from_args() {
        Command::Align(command) => command.run(),
    };

    if let Err(err) = res {
        eprintln!("error: {:?}", err);
        std::process::exit(1);
    }
}

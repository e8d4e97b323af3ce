use crate::cli::{DataArgs, ShowArgs, SubsetArgs, TriplesArgs};
use crate::dataset::{AlignedTriple, Dataset};
use crate::store;
use crate::tier::Tier;

pub fn metadata(args: DataArgs) -> anyhow::Result<()> {
    let dataset = Dataset::open(&args.data_dir)?;
    let metadata = dataset.metadata()?;
    for tier in Tier::ALL {
        let count = metadata
            .entries()
            .iter()
            .filter(|entry| entry.tier == tier)
            .count();
        println!("{tier}: {count}");
    }
    println!("total: {}", metadata.len());
    Ok(())
}

pub fn triples(args: TriplesArgs) -> anyhow::Result<()> {
    let dataset = Dataset::open(&args.data.data_dir)?;
    let triples: Vec<AlignedTriple> = dataset.aligned_triple_ids()?.collect();

    match args.out {
        Some(out) => {
            store::write_json_atomic(&out, &triples)?;
            tracing::info!(triples = triples.len(), out = %out.display(), "wrote triples");
        }
        None => {
            for triple in &triples {
                println!("{}\t{}\t{}", triple.kids, triple.students, triple.scholars);
            }
        }
    }
    Ok(())
}

pub fn subset(args: SubsetArgs) -> anyhow::Result<()> {
    let dataset = Dataset::open(&args.data.data_dir)?;
    let ids: Vec<String> = if args.aligned {
        dataset
            .aligned_triple_ids()?
            .flat_map(|triple| [triple.kids, triple.students, triple.scholars])
            .collect()
    } else {
        args.ids
    };

    let written = dataset.copy_subset(&ids, &args.out)?;
    println!("copied {written} of {} article(s) to {}", ids.len(), args.out.display());
    Ok(())
}

pub fn show(args: ShowArgs) -> anyhow::Result<()> {
    let dataset = Dataset::open(&args.data.data_dir)?;
    let Some(article) = dataset.article_by_id(&args.id)? else {
        anyhow::bail!("article {} is indexed but its file is missing", args.id);
    };
    println!("{}", article.summary());
    Ok(())
}
